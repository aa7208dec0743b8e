//! Backup endpoints: list, create, inspect, delete, restore, download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::UserPrincipal;
use crate::state::AppState;

async fn require_server(state: &AppState, id: &str) -> ApiResult<()> {
    state
        .store
        .server_by_id(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_server(&state, &id).await?;
    let backups = state.store.backups_for_server(&id)?;
    Ok(Json(json!(backups)))
}

pub async fn create(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_server(&state, &id).await?;
    let backup = state.backups.create(&id).await?;
    Ok(Json(json!(backup)))
}

pub async fn detail(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path((id, backup_id)): Path<(String, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    let backup = state.backups.resolve(&id, backup_id)?;
    Ok(Json(json!(backup)))
}

pub async fn delete(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path((id, backup_id)): Path<(String, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.backups.delete(&id, backup_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn restore(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path((id, backup_id)): Path<(String, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.backups.restore(&id, backup_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn download(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path((id, backup_id)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let backup = state.backups.resolve(&id, backup_id)?;
    let path = state.backups.file_path(&backup);
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("Backup file '{}'", backup.filename)))?;

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", backup.filename),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}
