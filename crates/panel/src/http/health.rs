//! Liveness and the aggregated platform health snapshot.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::error::ApiResult;
use crate::scheduler::{COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL};
use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Infrastructure services, the active game, and an overall verdict:
/// `operational` when every platform container runs, `degraded` otherwise.
pub async fn health_status(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let containers = state.docker.list_containers(true).await?;

    let services: Vec<serde_json::Value> = containers
        .iter()
        .filter(|c| {
            c.labels.get(COMPOSE_PROJECT_LABEL) == Some(&state.config.docker.compose_project)
        })
        .map(|c| {
            json!({
                "name": c
                    .labels
                    .get(COMPOSE_SERVICE_LABEL)
                    .cloned()
                    .unwrap_or_else(|| c.name.clone()),
                "state": c.state,
                "running": c.is_running(),
            })
        })
        .collect();

    let degraded = services
        .iter()
        .any(|s| s["running"] != serde_json::Value::Bool(true));

    let active_game = state
        .scheduler
        .active_game_container()
        .await?
        .and_then(|c| state.scheduler.server_id_of(&c.name));

    Ok(Json(json!({
        "status": if degraded { "degraded" } else { "operational" },
        "backendUptime": state.started_at.elapsed().as_secs(),
        "services": services,
        "activeGame": active_game,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
