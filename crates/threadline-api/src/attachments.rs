use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use threadline_db::models::NewUpload;
use threadline_storage::Storage;
use threadline_types::models::Attachment;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

pub const FILE_NAME_HEADER: &str = "x-file-name";

/// POST /attachments: stores the raw request body as a blob owned by the
/// caller and returns the attachment descriptor to put on a message. Each
/// upload may be attached to one message only.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::validation("attachment body is empty"));
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge {
            limit_mb: state.max_upload_bytes / (1024 * 1024),
        });
    }

    let name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("file")
        .to_string();

    let path = Storage::blob_path(claims.sub, Uuid::new_v4(), &name);
    let path = state.storage.upload(&path, &bytes).await?;

    let upload = NewUpload {
        path: path.clone(),
        owner_id: claims.sub,
        file_name: name.clone(),
        size: bytes.len(),
        sha256: Storage::digest(&bytes),
    };
    if let Err(e) = with_db(&state, move |db| db.record_upload(&upload)).await {
        if let Err(cleanup) = state.storage.remove(&path).await {
            warn!("Error deleting unrecorded blob {}: {:#}", path, cleanup);
        }
        return Err(e);
    }

    let url = state.storage.public_url(&path);
    info!("{} uploaded {} ({} bytes)", claims.username, name, bytes.len());

    Ok((StatusCode::CREATED, Json(Attachment { id: path, name, url })))
}

/// GET /attachments/{*path}: public read of a stored blob.
pub async fn download_attachment(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.storage.read(&path).await.map_err(|e| {
        error!("Failed to read blob {}: {:#}", path, e);
        ApiError::NotFound
    })?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}
