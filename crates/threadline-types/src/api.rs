use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Attachment, ChannelKind, Message, PresenceStatus};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the realtime websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Profiles --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectChannelRequest {
    pub peer_user_id: Uuid,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub parent_message_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

// -- Reactions --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
}

// -- Embeddings --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Embed a single message; when absent every message still lacking an
    /// embedding is backfilled.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub success: bool,
    pub embedded: usize,
}

// -- Search --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchResult {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub shared_by: Option<String>,
    pub shared_at: DateTime<Utc>,
    pub file_path: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSearchResult {
    pub id: Uuid,
    pub name: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
    pub title: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub messages: Vec<Message>,
    pub files: Vec<FileSearchResult>,
    pub people: Vec<PersonSearchResult>,
}
