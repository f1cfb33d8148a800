use axum::{Extension, Json, extract::State, response::IntoResponse};

use threadline_types::api::UpdateProfileRequest;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let profile = with_db(&state, move |db| db.get_profile(me))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let profile = with_db(&state, move |db| {
        db.update_profile_details(
            me,
            req.full_name.as_deref(),
            req.title.as_deref(),
            req.avatar_url.as_deref(),
        )?;
        db.get_profile(me)
    })
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}
