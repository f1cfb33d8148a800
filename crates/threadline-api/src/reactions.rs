use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use threadline_types::api::{ToggleReactionRequest, ToggleReactionResponse};
use threadline_types::events::ChangeEvent;
use threadline_types::models::RawReaction;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

const MAX_EMOJI_LENGTH: usize = 64;

pub async fn get_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reactions = with_db(&state, move |db| {
        if db.get_message(message_id)?.is_none() {
            return Ok(None);
        }
        db.get_reactions(message_id).map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(reactions))
}

/// Add the caller's emoji to a message, or remove it if already present.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let emoji = req.emoji.trim().to_string();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_LENGTH {
        return Err(ApiError::validation("emoji must be 1-64 bytes"));
    }

    let user_id = claims.sub;
    let toggled_emoji = emoji.clone();
    let added = with_db(&state, move |db| {
        if db.get_message(message_id)?.is_none() {
            return Ok(None);
        }
        db.toggle_reaction(message_id, user_id, &toggled_emoji).map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let row = RawReaction {
        message_id,
        user_id,
        emoji,
    };
    if added {
        state.feed.publish(ChangeEvent::reaction_added(row));
    } else {
        state.feed.publish(ChangeEvent::reaction_removed(row));
    }

    Ok(Json(ToggleReactionResponse { added }))
}
