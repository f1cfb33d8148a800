//! Row types that only exist at the storage layer. Rows that cross the wire
//! use the threadline-types models directly.

use chrono::{DateTime, Utc};
use threadline_types::models::{Attachment, MessageRecord};
use uuid::Uuid;

pub struct NewMessage {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub parent_message_id: Option<Uuid>,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// A stored blob, owned by its uploader until a message claims it.
pub struct NewUpload {
    pub path: String,
    pub owner_id: Uuid,
    pub file_name: String,
    pub size: usize,
    pub sha256: String,
}

/// An upload its owner may still attach to a message.
#[derive(Debug, Clone, PartialEq)]
pub struct UnclaimedUpload {
    pub path: String,
    pub file_name: String,
}

pub struct NewFileChunk {
    pub message_id: Uuid,
    pub attachment_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A file chunk returned by a similarity search, ranked best-first.
pub struct FileChunkMatch {
    pub message_id: Uuid,
    pub attachment_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub similarity: f32,
    pub shared_by: Option<String>,
    pub shared_at: DateTime<Utc>,
}

pub struct ScoredMessage {
    pub record: MessageRecord,
    pub similarity: f32,
}

/// A message still waiting for its embedding.
pub struct PendingEmbedding {
    pub id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
}
