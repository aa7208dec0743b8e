//! Error-report intake — forwards dashboard errors to the notifier.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::UserPrincipal;
use crate::notify::ErrorReport;
use crate::state::AppState;

pub async fn post_error(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Json(report): Json<ErrorReport>,
) -> ApiResult<Json<serde_json::Value>> {
    if report.message.trim().is_empty() {
        return Err(ApiError::Invalid("message is required".to_string()));
    }
    let sent = state.notifier.error(&report).await;
    Ok(Json(json!({ "ok": true, "sent": sent })))
}
