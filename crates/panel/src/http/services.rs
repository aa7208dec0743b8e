//! Infrastructure service operations — restart and log tailing for the
//! panel's own compose-managed containers, resolved by service label.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde_json::json;

use runtime::ContainerInfo;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::UserPrincipal;
use crate::http::streams::{log_payloads_for, sse_response};
use crate::scheduler::{COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL};
use crate::state::AppState;

const RESTART_GRACE_SECONDS: u32 = 10;

async fn resolve_service(state: &AppState, service: &str) -> ApiResult<ContainerInfo> {
    let containers = state.docker.list_containers(true).await?;
    containers
        .into_iter()
        .find(|c| {
            c.labels.get(COMPOSE_PROJECT_LABEL) == Some(&state.config.docker.compose_project)
                && c.labels.get(COMPOSE_SERVICE_LABEL).map(String::as_str) == Some(service)
        })
        .ok_or_else(|| ApiError::NotFound(format!("Service '{service}'")))
}

pub async fn restart(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let container = resolve_service(&state, &name).await?;
    state
        .docker
        .restart_container(&container.name, RESTART_GRACE_SECONDS)
        .await?;
    tracing::info!(service = %name, container = %container.name, "service restarted");
    Ok(Json(json!({ "ok": true, "message": format!("Service '{name}' restarted") })))
}

pub async fn logs(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let container = resolve_service(&state, &name).await?;
    let tty = state
        .docker
        .inspect_container(&container.name)
        .await
        .ok()
        .and_then(|info| info.state_info.map(|s| s.tty))
        .unwrap_or(false);
    Ok(sse_response(log_payloads_for(&state, container.name, tty)))
}
