//! Admission policies.
//!
//! Two principals reach the API: a user with an unexpired auth session
//! (cookie or bearer token) and the bot with the process-wide shared
//! secret. Handlers pick the policy by extractor: `UserPrincipal` for
//! user-only routes, `AnyPrincipal` where the bot is also welcome. The bot
//! check runs first; the request falls through to session resolution.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::now_unix;
use crate::store::sessions::AuthSession;

pub const SESSION_COOKIE: &str = "panel_session";
pub const BOT_KEY_HEADER: &str = "x-bot-api-key";

#[derive(Debug, Clone)]
pub enum Principal {
    User(AuthSession),
    Bot,
}

/// Requires a valid user session.
pub struct UserPrincipal(pub AuthSession);

/// Accepts either a user session or the bot shared secret.
pub struct AnyPrincipal(#[allow(dead_code)] pub Principal);

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn resolve_user(parts: &Parts, state: &AppState) -> Result<Option<AuthSession>, ApiError> {
    let Some(token) = cookie_token(parts).or_else(|| bearer_token(parts)) else {
        return Ok(None);
    };
    Ok(state.store.session_get(&token, now_unix())?)
}

fn is_bot(parts: &Parts, state: &AppState) -> bool {
    let secret = &state.config.auth.bot_api_key;
    if secret.is_empty() {
        return false;
    }
    parts
        .headers
        .get(BOT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|key| key == secret)
        .unwrap_or(false)
}

/// Resolve the calling user — the dashboard's "who am I".
pub async fn me(
    UserPrincipal(session): UserPrincipal,
) -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "principal_id": session.principal_id,
        "display_name": session.display_name,
        "avatar_ref": session.avatar_ref,
        "expires_at": session.expires_at,
    }))
}

pub async fn logout(
    axum::extract::State(state): axum::extract::State<AppState>,
    UserPrincipal(session): UserPrincipal,
) -> Result<axum::response::Json<serde_json::Value>, ApiError> {
    state.store.session_delete(&session.token)?;
    Ok(axum::response::Json(serde_json::json!({ "ok": true })))
}

impl FromRequestParts<AppState> for UserPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, state)? {
            Some(session) => Ok(UserPrincipal(session)),
            None => Err(ApiError::Unauthorized),
        }
    }
}

impl FromRequestParts<AppState> for AnyPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if is_bot(parts, state) {
            return Ok(AnyPrincipal(Principal::Bot));
        }
        match resolve_user(parts, state)? {
            Some(session) => Ok(AnyPrincipal(Principal::User(session))),
            None => Err(ApiError::Unauthorized),
        }
    }
}
