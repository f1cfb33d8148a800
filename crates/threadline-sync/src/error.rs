use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not signed in or session expired")]
    Auth,
    #[error("requested object doesn't exist")]
    NotFound,
    #[error("only the author may {0} this message")]
    NotAuthor(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("no channel is open")]
    NoChannel,
    /// The channel the operation was issued for is no longer the open one.
    #[error("channel switched before the result arrived")]
    Superseded,
}

/// Problems with user input, reported before or instead of a network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message needs content or an attachment")]
    EmptyMessage,
    #[error("{name} is {size} bytes, over the {limit} byte attachment limit")]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
    /// Nothing is left to send because every file was refused.
    #[error("no attachment could be sent ({} refused)", .0.len())]
    AttachmentsRejected(Vec<ValidationError>),
    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(format!("malformed payload: {e}"))
    }
}
