//! Video upload handler.
//!
//! Validates content type against an allow-list and enforces the size
//! ceiling, then writes the file into the videos directory the execution
//! units mount. The returned path is what a `local_file` session source
//! carries; the orchestrator relies on this validation and never re-checks
//! file content itself.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::state::AppState;

/// Response for a successful upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub content_type: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct UploadErrorResponse {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<UploadErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(UploadErrorResponse {
            error: message.into(),
        }),
    )
}

/// Accept a multipart video upload: a `user_id` text field and a `video`
/// file field.
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, Json<UploadErrorResponse>)> {
    let mut user_id: Option<String> = None;
    let mut video: Option<(String, String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart request: {}", e)))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("user_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid user_id field: {}", e)))?;
                user_id = Some(value);
            }
            Some("video") => {
                let content_type = field
                    .content_type()
                    .map(|t| t.to_string())
                    .ok_or_else(|| bad_request("video field is missing a content type"))?;

                let original_name = field.file_name().unwrap_or("upload.mp4").to_string();

                let bytes = field.bytes().await.map_err(|e| {
                    bad_request(format!("failed to read video field: {}", e))
                })?;

                video = Some((content_type, original_name, bytes));
            }
            _ => {
                // Unknown fields are skipped, not rejected.
                continue;
            }
        }
    }

    let user_id = user_id.ok_or_else(|| bad_request("user_id is required"))?;
    let (content_type, original_name, bytes) =
        video.ok_or_else(|| bad_request("no video file provided"))?;

    let uploads = state.uploads();

    if !uploads.allowed_types.iter().any(|t| t == &content_type) {
        return Err(bad_request(format!(
            "unsupported file type: {}. Allowed types: {}",
            content_type,
            uploads.allowed_types.join(", ")
        )));
    }

    if bytes.len() as u64 > uploads.max_size_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(UploadErrorResponse {
                error: format!(
                    "file too large: {} bytes. Maximum allowed: {} bytes",
                    bytes.len(),
                    uploads.max_size_bytes
                ),
            }),
        ));
    }

    let filename = unique_filename(&user_id, &original_name);
    let dir = state.videos_dir().to_string();
    let path = format!("{}/{}", dir.trim_end_matches('/'), filename);

    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        warn!(error = %e, dir = %dir, "failed to create videos directory");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(UploadErrorResponse {
                error: "failed to store upload".to_string(),
            }),
        )
    })?;

    let size = bytes.len() as u64;
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        warn!(error = %e, path = %path, "failed to write upload");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(UploadErrorResponse {
                error: "failed to store upload".to_string(),
            }),
        )
    })?;

    info!(%filename, size, "video uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            filename,
            path,
            size,
            content_type,
        }),
    ))
}

/// Build a collision-free file name: `<user>-<timestamp>-<random>.<ext>`.
fn unique_filename(user_id: &str, original_name: &str) -> String {
    let user: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();
    let user = if user.is_empty() { "anonymous".to_string() } else { user };

    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()) && !e.is_empty())
        .unwrap_or("mp4");

    let random = uuid::Uuid::new_v4().to_string();
    let random = &random[..8];

    format!(
        "{}-{}-{}.{}",
        user,
        chrono::Utc::now().timestamp_millis(),
        random,
        extension
    )
}
