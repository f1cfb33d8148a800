use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use threadline_realtime::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{attachments, channels, embeddings, messages, profiles, reactions, search};

/// Headroom above the attachment cap so oversized uploads reach the handler
/// and get a 413 with a JSON body instead of a bare rejection.
const BODY_LIMIT_HEADROOM: usize = 1024 * 1024;

/// Every HTTP and websocket route. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/attachments/{*path}", get(attachments::download_attachment))
        .route("/realtime", get(realtime_upgrade));

    let protected_routes = Router::new()
        .route("/me", get(profiles::get_me).patch(profiles::update_me))
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/direct", post(channels::open_direct_channel))
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_channel_messages).post(messages::send_message),
        )
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            get(reactions::get_reactions).post(reactions::toggle_reaction),
        )
        .route(
            "/attachments",
            post(attachments::upload_attachment)
                .layer(DefaultBodyLimit::max(state.max_upload_bytes + BODY_LIMIT_HEADROOM)),
        )
        .route("/embeddings", post(embeddings::create_embeddings))
        .route("/embeddings/search", get(search::search))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "realtime_connections": state.feed.active_connections(),
    }))
}

async fn realtime_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.feed.clone(), state.jwt_secret.clone())
    })
}
