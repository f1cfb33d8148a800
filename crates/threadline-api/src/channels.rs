use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use threadline_types::api::{CreateChannelRequest, DirectChannelRequest};
use threadline_types::models::ChannelKind;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

const MAX_CHANNEL_NAME: usize = 80;

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = with_db(&state, |db| db.list_channels()).await?;
    Ok(Json(channels))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_lowercase();
    if name.is_empty() || name.len() > MAX_CHANNEL_NAME {
        return Err(ApiError::validation("channel name must be 1-80 characters"));
    }
    if name.starts_with("dm:") || req.kind == ChannelKind::Direct {
        return Err(ApiError::validation(
            "direct channels are created through /channels/direct",
        ));
    }

    let kind = req.kind;
    let channel = with_db(&state, move |db| db.create_channel(&name, kind)).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = with_db(&state, move |db| db.get_channel(channel_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(channel))
}

/// Find or create the direct-message channel between the caller and a peer.
pub async fn open_direct_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DirectChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let peer = req.peer_user_id;

    let channel = with_db(&state, move |db| {
        if db.get_profile(peer)?.is_none() {
            return Ok(None);
        }
        db.find_or_create_direct_channel(me, peer).map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(channel))
}
