use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reactions::{ReactionSummary, aggregate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a profile that is joined onto every fetched message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
    Direct,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name of the direct-message channel between two users.
///
/// The pair is sorted first, so both participants derive the same name and
/// the name can be used as the lookup key for the conversation.
pub fn channel_name_for(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{}:{}", lo, hi)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Blob store path; doubles as the identifier used for cleanup.
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A single reaction row as stored: one user, one emoji, one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
}

/// A message as returned by the row store, joined with its author and raw
/// reaction rows. Channel loads also fill `replies` one level deep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Option<Author>,
    #[serde(default)]
    pub reactions: Vec<RawReaction>,
    #[serde(default)]
    pub replies: Vec<MessageRecord>,
}

impl MessageRecord {
    pub fn is_top_level(&self) -> bool {
        self.parent_message_id.is_none()
    }

    /// Fold raw reactions into summaries, recursively for replies.
    pub fn into_message(self) -> Message {
        Message {
            reactions: aggregate(&self.reactions),
            replies: self.replies.into_iter().map(MessageRecord::into_message).collect(),
            id: self.id,
            channel_id: self.channel_id,
            user_id: self.user_id,
            parent_message_id: self.parent_message_id,
            content: self.content,
            attachments: self.attachments,
            created_at: self.created_at,
            updated_at: self.updated_at,
            user: self.user,
        }
    }
}

/// Render-ready message: reactions aggregated per emoji, replies nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Option<Author>,
    pub reactions: Vec<ReactionSummary>,
    pub replies: Vec<Message>,
}

pub const ONLINE_WINDOW_MINUTES: i64 = 5;
pub const AWAY_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    /// Presence relative to `now`: seen within 5 minutes is online, within
    /// 30 minutes is away, anything older (or never) is offline.
    pub fn at(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(last_seen) = last_seen else {
            return Self::Offline;
        };
        let idle = now - last_seen;
        if idle <= Duration::minutes(ONLINE_WINDOW_MINUTES) {
            Self::Online
        } else if idle <= Duration::minutes(AWAY_WINDOW_MINUTES) {
            Self::Away
        } else {
            Self::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_channel_name_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(channel_name_for(a, b), channel_name_for(b, a));
        assert_ne!(channel_name_for(a, b), channel_name_for(a, Uuid::new_v4()));
    }

    #[test]
    fn presence_thresholds() {
        let now = Utc::now();
        assert_eq!(PresenceStatus::at(Some(now), now), PresenceStatus::Online);
        assert_eq!(
            PresenceStatus::at(Some(now - Duration::minutes(5)), now),
            PresenceStatus::Online
        );
        assert_eq!(
            PresenceStatus::at(Some(now - Duration::minutes(6)), now),
            PresenceStatus::Away
        );
        assert_eq!(
            PresenceStatus::at(Some(now - Duration::minutes(30)), now),
            PresenceStatus::Away
        );
        assert_eq!(
            PresenceStatus::at(Some(now - Duration::minutes(31)), now),
            PresenceStatus::Offline
        );
        assert_eq!(PresenceStatus::at(None, now), PresenceStatus::Offline);
    }

    #[test]
    fn channel_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChannelKind::Direct).unwrap();
        assert_eq!(json, "\"direct\"");
        assert_eq!(ChannelKind::parse("private"), Some(ChannelKind::Private));
        assert_eq!(ChannelKind::parse("voice"), None);
    }
}
