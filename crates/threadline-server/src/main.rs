mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use threadline_api::embedder::{Embedder, OpenAiEmbedder, UnavailableEmbedder};
use threadline_api::{AppState, AppStateInner};
use threadline_db::Database;
use threadline_realtime::ChangeFeed;
use threadline_storage::Storage;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadline=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and blob storage
    let db = Database::open(&config.db_path)?;
    let storage = Storage::new(config.storage_dir.clone(), config.public_url.as_str()).await?;

    let embedder: Arc<dyn Embedder> = match &config.openai_api_key {
        Some(key) => Arc::new(OpenAiEmbedder::new(config.openai_base_url.as_str(), key.as_str())),
        None => {
            warn!("OPENAI_API_KEY not set; embeddings and search are disabled");
            Arc::new(UnavailableEmbedder)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        storage,
        feed: ChangeFeed::new(),
        embedder,
        jwt_secret: config.jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes(),
    });

    let app = threadline_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Threadline server listening on {}", addr);
    info!("Attachment limit: {} MB", config.max_upload_mb);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
