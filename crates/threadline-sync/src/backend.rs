use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use threadline_types::api::SendMessageRequest;
use threadline_types::events::{ChangeEvent, Subscription};
use threadline_types::models::{Attachment, Channel, MessageRecord, RawReaction};

use crate::error::SyncError;

/// A file picked for sending, not yet uploaded.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub bytes: Bytes,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Everything the sync engine needs from the hosted backend: the row store,
/// the realtime change feed, blob storage and the embeddings endpoint.
pub trait Backend: Send + Sync {
    fn channel(&self, channel_id: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>>;

    /// Find or create the direct-message channel with `peer`.
    fn direct_channel(&self, peer: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>>;

    /// Top-level messages oldest first, replies nested one level, raw
    /// reactions on every message.
    fn load_channel(&self, channel_id: Uuid)
    -> BoxFuture<'_, Result<Vec<MessageRecord>, SyncError>>;

    /// `None` when the message no longer exists.
    fn fetch_message(&self, id: Uuid) -> BoxFuture<'_, Result<Option<MessageRecord>, SyncError>>;

    fn fetch_reactions(&self, message_id: Uuid)
    -> BoxFuture<'_, Result<Vec<RawReaction>, SyncError>>;

    /// Open a change stream. The stream ends when the connection drops.
    fn subscribe(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> BoxFuture<'_, Result<BoxStream<'static, ChangeEvent>, SyncError>>;

    fn upload(&self, file: OutgoingFile) -> BoxFuture<'_, Result<Attachment, SyncError>>;

    fn insert_message(
        &self,
        channel_id: Uuid,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, Result<MessageRecord, SyncError>>;

    /// Returns whether the reaction is present afterwards.
    fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: String,
    ) -> BoxFuture<'_, Result<bool, SyncError>>;

    fn delete_message(&self, id: Uuid) -> BoxFuture<'_, Result<(), SyncError>>;

    fn request_embedding(&self, message_id: Uuid) -> BoxFuture<'_, Result<(), SyncError>>;
}
