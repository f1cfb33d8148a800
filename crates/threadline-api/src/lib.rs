pub mod attachments;
pub mod channels;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod reactions;
pub mod routes;
pub mod search;
pub mod state;


pub use routes::router;
pub use state::{AppState, AppStateInner};
