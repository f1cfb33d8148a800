use std::sync::Arc;

use threadline_db::Database;
use threadline_realtime::ChangeFeed;
use threadline_storage::Storage;
use tracing::error;

use crate::embedder::Embedder;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub feed: ChangeFeed,
    pub embedder: Arc<dyn Embedder>,
    pub jwt_secret: String,
    pub max_upload_bytes: usize,
}

/// Run a blocking DB call off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}
