use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use threadline_db::models::NewMessage;
use threadline_types::api::{EditMessageRequest, SendMessageRequest};
use threadline_types::events::ChangeEvent;
use threadline_types::models::Attachment;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

const MAX_CONTENT_LENGTH: usize = 40_000;

/// Top-level messages of a channel, oldest first, each with its replies and
/// raw reaction rows.
pub async fn get_channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = with_db(&state, move |db| {
        if db.get_channel(channel_id)?.is_none() {
            return Ok(None);
        }
        db.get_channel_messages(channel_id).map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() && req.attachments.is_empty() {
        return Err(ApiError::validation("message needs content or an attachment"));
    }
    if req.content.len() > MAX_CONTENT_LENGTH {
        return Err(ApiError::validation("message content is too long"));
    }

    let parent_id = req.parent_message_id;
    let (channel, parent) = with_db(&state, move |db| {
        let channel = db.get_channel(channel_id)?;
        let parent = match parent_id {
            Some(id) => db.get_message(id)?,
            None => None,
        };
        Ok((channel, parent))
    })
    .await?;

    if channel.is_none() {
        return Err(ApiError::NotFound);
    }
    if let Some(parent_id) = parent_id {
        // Replies nest one level deep and stay in their parent's channel
        match parent {
            Some(p) if p.channel_id == channel_id && p.is_top_level() => {}
            Some(_) => {
                return Err(ApiError::validation(
                    "replies must target a top-level message in the same channel",
                ));
            }
            None => {
                warn!("Reply to unknown message {} rejected", parent_id);
                return Err(ApiError::NotFound);
            }
        }
    }

    let attachments = owned_attachments(&state, claims.sub, &req.attachments).await?;

    let new_message = NewMessage {
        id: Uuid::new_v4(),
        channel_id,
        user_id: claims.sub,
        parent_message_id: parent_id,
        content: req.content,
        attachments,
    };
    let record = with_db(&state, move |db| db.insert_message(&new_message)).await?;

    state.feed.publish(ChangeEvent::message_inserted(&record));

    Ok((StatusCode::CREATED, Json(record)))
}

/// Resolve requested attachments against the caller's unclaimed uploads.
/// Names and URLs come from the upload record, not from the request.
async fn owned_attachments(
    state: &AppState,
    owner: Uuid,
    requested: &[Attachment],
) -> Result<Vec<Attachment>, ApiError> {
    if requested.is_empty() {
        return Ok(vec![]);
    }
    let mut paths: Vec<String> = Vec::with_capacity(requested.len());
    for attachment in requested {
        if paths.contains(&attachment.id) {
            return Err(ApiError::validation("attachment listed twice"));
        }
        paths.push(attachment.id.clone());
    }

    let lookup = paths.clone();
    let uploads = with_db(state, move |db| db.unclaimed_uploads(owner, &lookup)).await?;

    paths
        .into_iter()
        .map(|path| {
            let Some(upload) = uploads.iter().find(|u| u.path == path) else {
                warn!("{} tried to attach {} which is not an unused upload of theirs", owner, path);
                return Err(ApiError::validation(
                    "attachments must be your own uploads not yet used by another message",
                ));
            };
            Ok(Attachment {
                url: state.storage.public_url(&upload.path),
                name: upload.file_name.clone(),
                id: path,
            })
        })
        .collect()
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let record = with_db(&state, move |db| db.get_message(message_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(record))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.len() > MAX_CONTENT_LENGTH {
        return Err(ApiError::validation("message content is too long"));
    }

    let existing = with_db(&state, move |db| db.get_message(message_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    if existing.user_id != Some(claims.sub) {
        return Err(ApiError::NotAuthor("edit"));
    }
    if req.content.trim().is_empty() && existing.attachments.is_empty() {
        return Err(ApiError::validation("message needs content or an attachment"));
    }

    let record = with_db(&state, move |db| db.update_message_content(message_id, &req.content))
        .await?
        .ok_or(ApiError::NotFound)?;

    state.feed.publish(ChangeEvent::message_updated(&record));

    Ok(Json(record))
}

/// DELETE /messages/{id}: only the author may delete. Replies and reactions
/// cascade in the store; the blobs the thread owned are removed afterwards
/// in the background and cleanup failures never fail the request.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = with_db(&state, move |db| db.get_message(message_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    if existing.user_id != Some(claims.sub) {
        return Err(ApiError::NotAuthor("delete"));
    }

    let blobs = with_db(&state, move |db| db.delete_message(message_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    state.feed.publish(ChangeEvent::message_deleted(&existing));
    info!("{} deleted message {}", claims.username, message_id);

    if !blobs.is_empty() {
        let cleanup_state = state.clone();
        tokio::spawn(async move {
            for path in blobs {
                if let Err(e) = cleanup_state.storage.remove(&path).await {
                    warn!("Error deleting attachment {}: {:#}", path, e);
                }
            }
        });
    }

    Ok(StatusCode::NO_CONTENT)
}
