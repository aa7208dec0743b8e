//! Server banner images: upload, fetch, remove.
//!
//! Uploads are capped at 5 MiB and sniffed by magic bytes; only JPEG, PNG,
//! and WebP pass. Files land at `<DATA_DIR>/banners/<server_id>.<ext>`.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::UserPrincipal;
use crate::state::AppState;

const MAX_BANNER_BYTES: usize = 5 * 1024 * 1024;
const EXTENSIONS: &[&str] = &["jpg", "png", "webp"];

/// (extension, content-type) from magic bytes; `None` for anything else.
fn sniff_image(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some(("jpg", "image/jpeg"))
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]) {
        Some(("png", "image/png"))
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(("webp", "image/webp"))
    } else {
        None
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

pub async fn upload(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Invalid(format!("Bad upload: {e}")))?
        .ok_or_else(|| ApiError::Invalid("No file in upload".to_string()))?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Invalid(format!("Bad upload: {e}")))?;

    if bytes.len() > MAX_BANNER_BYTES {
        return Err(ApiError::Invalid("Banner exceeds 5 MiB".to_string()));
    }
    let (ext, _) = sniff_image(&bytes)
        .ok_or_else(|| ApiError::Invalid("Banner must be JPEG, PNG, or WebP".to_string()))?;

    let dir = state.config.banners_dir();
    tokio::fs::create_dir_all(&dir).await?;
    // One banner per server: clear other-extension leftovers first.
    for other in EXTENSIONS.iter().filter(|e| **e != ext) {
        let _ = tokio::fs::remove_file(dir.join(format!("{id}.{other}"))).await;
    }
    tokio::fs::write(dir.join(format!("{id}.{ext}")), &bytes).await?;

    let banner_path = format!("banners/{id}.{ext}");
    state
        .store
        .server_update_theme(&id, Some(&banner_path), None)?;
    Ok(Json(json!({ "ok": true, "banner_path": banner_path })))
}

pub async fn fetch(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let server = state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    let banner_path = server
        .banner_path
        .ok_or_else(|| ApiError::NotFound("Banner".to_string()))?;

    let full_path = std::path::Path::new(&state.config.paths.data_dir).join(&banner_path);
    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(|_| ApiError::NotFound("Banner".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, content_type_for(&banner_path))],
        bytes,
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;

    let dir = state.config.banners_dir();
    for ext in EXTENSIONS {
        let _ = tokio::fs::remove_file(dir.join(format!("{id}.{ext}"))).await;
    }
    state.store.server_clear_banner(&id)?;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_identify_formats() {
        assert_eq!(sniff_image(&[0xff, 0xd8, 0xff, 0xe0, 0, 0]).unwrap().0, "jpg");
        assert_eq!(
            sniff_image(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0])
                .unwrap()
                .0,
            "png"
        );
        let mut webp = Vec::from(*b"RIFF");
        webp.extend_from_slice(&[0, 0, 0, 0]);
        webp.extend_from_slice(b"WEBP");
        assert_eq!(sniff_image(&webp).unwrap().0, "webp");
    }

    #[test]
    fn non_images_are_rejected() {
        assert!(sniff_image(b"GIF89a....").is_none());
        assert!(sniff_image(b"<svg xmlns=...>").is_none());
        assert!(sniff_image(b"").is_none());
        assert!(sniff_image(b"RIFF1234WAVE").is_none());
    }
}
