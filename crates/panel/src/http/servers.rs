//! Server CRUD, start/stop, config, and run history.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::{AnyPrincipal, UserPrincipal};
use crate::scheduler::ServerStatus;
use crate::state::AppState;
use crate::store::now_unix;
use crate::store::servers::Server;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Option<String>,
}

/// `^[a-z0-9_-]+$`
fn is_valid_slug(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Engine state for every managed container, keyed by container name.
async fn container_states(state: &AppState) -> ApiResult<HashMap<String, String>> {
    let containers = state.docker.list_containers(true).await?;
    Ok(containers
        .into_iter()
        .map(|c| (c.name.clone(), c.state))
        .collect())
}

fn status_from_map(state: &AppState, states: &HashMap<String, String>, id: &str) -> ServerStatus {
    match states.get(&state.scheduler.container_name(id)) {
        Some(engine_state) => ServerStatus::from_engine_state(engine_state),
        None => ServerStatus::Missing,
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let states = container_states(&state).await?;
    let needle = query.search.unwrap_or_default().to_lowercase();

    let servers: Vec<serde_json::Value> = state
        .store
        .servers_all()?
        .into_iter()
        .filter(|s| {
            needle.is_empty()
                || s.id.contains(&needle)
                || s.name.to_lowercase().contains(&needle)
        })
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "game_type": s.game_type,
                "port": s.port,
                "status": status_from_map(&state, &states, &s.id),
            })
        })
        .collect();

    Ok(Json(json!(servers)))
}

/// Game templates are opaque `(image, port, env, volumes)` tuples read from
/// the data dir; a missing file is an empty catalog.
pub async fn catalog(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let templates = load_templates(&state).await;
    let needle = query.search.unwrap_or_default().to_lowercase();
    let filtered: Vec<serde_json::Value> = templates
        .into_iter()
        .filter(|t| {
            needle.is_empty()
                || ["id", "name", "game_type"].iter().any(|field| {
                    t.get(field)
                        .and_then(|v| v.as_str())
                        .map(|v| v.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
        })
        .collect();
    Ok(Json(json!(filtered)))
}

async fn load_templates(state: &AppState) -> Vec<serde_json::Value> {
    let path = state.config.templates_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "unparseable template catalog");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub template_id: Option<String>,
    pub id: String,
    pub name: String,
    #[serde(alias = "image")]
    pub docker_image: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub env_vars: Option<HashMap<String, String>>,
    #[serde(default)]
    pub volumes: Option<HashMap<String, String>>,
}

pub async fn create(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Json(body): Json<CreateServerRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !is_valid_slug(&body.id) {
        return Err(ApiError::Invalid(
            "Server id must match [a-z0-9_-]+".to_string(),
        ));
    }
    if body.name.trim().is_empty() {
        return Err(ApiError::Invalid("Server name is required".to_string()));
    }

    // Explicit fields win over the template's.
    let template = match &body.template_id {
        Some(template_id) => load_templates(&state)
            .await
            .into_iter()
            .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(template_id.as_str())),
        None => None,
    };
    let from_template = |field: &str| -> Option<serde_json::Value> {
        template.as_ref().and_then(|t| t.get(field)).cloned()
    };

    let docker_image = body
        .docker_image
        .clone()
        .or_else(|| from_template("docker_image").and_then(|v| v.as_str().map(str::to_string)))
        .ok_or_else(|| ApiError::Invalid("docker_image is required".to_string()))?;
    let port = body
        .port
        .or_else(|| {
            from_template("port")
                .and_then(|v| v.as_u64())
                .and_then(|p| u16::try_from(p).ok())
        })
        .ok_or_else(|| ApiError::Invalid("port is required".to_string()))?;
    let env_vars = body.env_vars.clone().unwrap_or_else(|| {
        from_template("env_vars")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    });
    let volumes = body.volumes.clone().unwrap_or_else(|| {
        from_template("volumes")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| HashMap::from([(format!("/data/{}", body.id), "/data".to_string())]))
    });
    let game_type = from_template("game_type")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "custom".to_string());

    if state.store.server_by_id(&body.id)?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Server '{}' already exists",
            body.id
        )));
    }
    if let Some(holder) = state.store.server_port_conflict(port, &body.id)? {
        return Err(ApiError::Conflict(format!(
            "Port {port} is already used by {holder}"
        )));
    }

    state.store.server_insert(&Server {
        id: body.id.clone(),
        name: body.name.clone(),
        game_type,
        docker_image,
        port,
        env_vars,
        volumes,
        created_at: now_unix(),
        banner_path: None,
        accent_color: None,
    })?;

    tracing::info!(server = %body.id, "server created");
    Ok(Json(json!({ "ok": true })))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let server = state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    let status = state.scheduler.status(&id).await?;
    let mut value = serde_json::to_value(&server)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    value["status"] = json!(status);
    Ok(Json(value))
}

pub async fn delete(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.delete(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn start(
    State(state): State<AppState>,
    _principal: AnyPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.start(&id).await?;
    Ok(Json(json!({ "ok": true, "message": format!("Server '{id}' started") })))
}

pub async fn stop(
    State(state): State<AppState>,
    _principal: AnyPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let message = state.scheduler.stop(&id).await?;
    Ok(Json(json!({ "ok": true, "message": message })))
}

pub async fn restart(
    State(state): State<AppState>,
    _principal: AnyPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.restart(&id).await?;
    Ok(Json(json!({ "ok": true, "message": format!("Server '{id}' restarted") })))
}

pub async fn get_config(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let server = state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    Ok(Json(json!({
        "docker_image": server.docker_image,
        "env_vars": server.env_vars,
        "accent_color": server.accent_color,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub docker_image: String,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub accent_color: Option<String>,
}

pub async fn put_config(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
    Json(body): Json<UpdateConfigRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    if state.scheduler.status(&id).await? == ServerStatus::Running {
        return Err(ApiError::Invalid(
            "Cannot edit config while server is running".to_string(),
        ));
    }
    if body.docker_image.trim().is_empty() {
        return Err(ApiError::Invalid("docker_image is required".to_string()));
    }

    state
        .store
        .server_update_config(&id, &body.docker_image, &body.env_vars)?;
    if let Some(color) = &body.accent_color {
        state.store.server_update_theme(&id, None, Some(color))?;
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn history(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;

    let now = now_unix();
    let rows: Vec<serde_json::Value> = state
        .store
        .run_history(&id)?
        .into_iter()
        .map(|run| {
            json!({
                "id": run.id,
                "started_at": run.started_at,
                "stopped_at": run.stopped_at,
                "duration_seconds": run.stopped_at.unwrap_or(now) - run.started_at,
                "stop_reason": run.stop_reason,
            })
        })
        .collect();
    Ok(Json(json!(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("mc"));
        assert!(is_valid_slug("valheim_2"));
        assert!(is_valid_slug("a-b-c"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("MC"));
        assert!(!is_valid_slug("mc server"));
        assert!(!is_valid_slug("mc/./etc"));
        assert!(!is_valid_slug("active!"));
    }
}
