//! Client-side synchronization for threadline channels.
//!
//! A [`ChannelSession`] mirrors one channel as a [`MessageTree`], keeps it
//! current from the realtime change feed and offers the outbound commands
//! (send, react, delete). The backend is reached through the [`Backend`]
//! trait; [`HttpBackend`] talks to a threadline server.

pub mod backend;
pub mod commands;
pub mod error;
pub mod http;
pub(crate) mod ingest;
pub mod session;
pub mod tree;

#[cfg(test)]
mod tests;

pub use backend::{Backend, OutgoingFile};
pub use commands::{MAX_ATTACHMENT_BYTES, SendOutcome};
pub use error::{SyncError, ValidationError};
pub use http::HttpBackend;
pub use session::{ChannelSession, ChannelTarget};
pub use threadline_types::reactions::{ReactionSummary, aggregate};
pub use tree::{Applied, MessageTree};
