//! Panel and bot settings. Writes are filtered against the recognized-key
//! allow-lists; unknown keys are dropped silently.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;
use std::collections::HashMap;

use crate::error::ApiResult;
use crate::http::auth::{AnyPrincipal, UserPrincipal};
use crate::state::AppState;
use crate::store::settings::{BOT_KEYS, PANEL_KEYS};

pub async fn get_settings(
    State(state): State<AppState>,
    _principal: AnyPrincipal,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!(state.store.panel_settings_all()?)))
}

pub async fn put_settings(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Json(body): Json<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    for (key, value) in &body {
        if PANEL_KEYS.contains(&key.as_str()) {
            state.store.panel_setting_set(key, value)?;
        }
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_bot_settings(
    State(state): State<AppState>,
    _user: UserPrincipal,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!(state.store.bot_settings_all()?)))
}

pub async fn put_bot_settings(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Json(body): Json<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    for (key, value) in &body {
        if BOT_KEYS.contains(&key.as_str()) {
            state.store.bot_setting_set(key, value)?;
        }
    }
    Ok(Json(json!({ "ok": true })))
}

/// The configured channel targets, for the dashboard's pickers. Channel
/// discovery against the chat API belongs to the bot frontend.
pub async fn get_bot_channels(
    State(state): State<AppState>,
    _user: UserPrincipal,
) -> ApiResult<Json<serde_json::Value>> {
    let channels: Vec<serde_json::Value> = BOT_KEYS
        .iter()
        .filter(|key| key.ends_with("_channel_id"))
        .map(|key| {
            Ok(json!({
                "key": key,
                "channel_id": state.store.bot_setting(key)?,
            }))
        })
        .collect::<ApiResult<_>>()?;
    Ok(Json(json!(channels)))
}
