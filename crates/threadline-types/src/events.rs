use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageRecord, RawReaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Messages,
    Reactions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Identity columns of a changed message row. Consumers re-fetch the full
/// message rather than trusting this payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChange {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub parent_message_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl From<&MessageRecord> for MessageChange {
    fn from(record: &MessageRecord) -> Self {
        Self {
            id: record.id,
            channel_id: record.channel_id,
            parent_message_id: record.parent_message_id,
            user_id: record.user_id,
        }
    }
}

/// A committed row change, published on the realtime feed in commit order
/// per table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "lowercase")]
pub enum ChangeEvent {
    Messages {
        event: ChangeKind,
        old: Option<MessageChange>,
        new: Option<MessageChange>,
    },
    Reactions {
        event: ChangeKind,
        old: Option<RawReaction>,
        new: Option<RawReaction>,
    },
}

impl ChangeEvent {
    pub fn message_inserted(record: &MessageRecord) -> Self {
        Self::Messages {
            event: ChangeKind::Insert,
            old: None,
            new: Some(record.into()),
        }
    }

    pub fn message_updated(record: &MessageRecord) -> Self {
        Self::Messages {
            event: ChangeKind::Update,
            old: Some(record.into()),
            new: Some(record.into()),
        }
    }

    pub fn message_deleted(record: &MessageRecord) -> Self {
        Self::Messages {
            event: ChangeKind::Delete,
            old: Some(record.into()),
            new: None,
        }
    }

    pub fn reaction_added(row: RawReaction) -> Self {
        Self::Reactions {
            event: ChangeKind::Insert,
            old: None,
            new: Some(row),
        }
    }

    pub fn reaction_removed(row: RawReaction) -> Self {
        Self::Reactions {
            event: ChangeKind::Delete,
            old: Some(row),
            new: None,
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Messages { .. } => Table::Messages,
            Self::Reactions { .. } => Table::Reactions,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Messages { event, .. } | Self::Reactions { event, .. } => *event,
        }
    }

    /// Channel the change belongs to. Reaction rows carry no channel column,
    /// so reaction changes are never channel-scoped.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::Messages { old, new, .. } => new.as_ref().or(old.as_ref()).map(|m| m.channel_id),
            Self::Reactions { .. } => None,
        }
    }
}

/// One realtime subscription: a table plus an optional channel filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub table: Table,
    #[serde(default)]
    pub channel_id: Option<Uuid>,
}

impl Subscription {
    pub fn messages_in(channel_id: Uuid) -> Self {
        Self {
            table: Table::Messages,
            channel_id: Some(channel_id),
        }
    }

    pub fn reactions() -> Self {
        Self {
            table: Table::Reactions,
            channel_id: None,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.table != event.table() {
            return false;
        }
        match self.channel_id {
            Some(wanted) => event.channel_id() == Some(wanted),
            None => true,
        }
    }
}

/// Commands sent FROM client TO server over the realtime websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeCommand {
    /// Authenticate the connection
    Identify { token: String },

    /// Replace the connection's subscription set
    Subscribe { subscriptions: Vec<Subscription> },
}

/// Frames sent FROM server TO client over the realtime websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeFrame {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// The filters from the latest `Subscribe` are in effect; every change
    /// published from now on is matched against them
    Subscribed { subscriptions: usize },

    /// A subscribed row changed
    Change(ChangeEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_change(channel_id: Uuid) -> MessageChange {
        MessageChange {
            id: Uuid::new_v4(),
            channel_id,
            parent_message_id: None,
            user_id: None,
        }
    }

    #[test]
    fn message_subscription_filters_by_channel() {
        let channel = Uuid::new_v4();
        let other = Uuid::new_v4();
        let sub = Subscription::messages_in(channel);

        let here = ChangeEvent::Messages {
            event: ChangeKind::Insert,
            old: None,
            new: Some(message_change(channel)),
        };
        let elsewhere = ChangeEvent::Messages {
            event: ChangeKind::Delete,
            old: Some(message_change(other)),
            new: None,
        };

        assert!(sub.matches(&here));
        assert!(!sub.matches(&elsewhere));
    }

    #[test]
    fn reaction_subscription_is_unfiltered() {
        let event = ChangeEvent::reaction_added(RawReaction {
            message_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            emoji: "👍".into(),
        });
        assert!(Subscription::reactions().matches(&event));
        assert!(!Subscription::messages_in(Uuid::new_v4()).matches(&event));
    }

    #[test]
    fn change_frame_wire_shape() {
        let event = ChangeEvent::reaction_removed(RawReaction {
            message_id: Uuid::nil(),
            user_id: Uuid::nil(),
            emoji: "🎉".into(),
        });
        let json = serde_json::to_value(RealtimeFrame::Change(event.clone())).unwrap();

        assert_eq!(json["type"], "Change");
        assert_eq!(json["data"]["table"], "reactions");
        assert_eq!(json["data"]["event"], "DELETE");

        let parsed: RealtimeFrame = serde_json::from_value(json).unwrap();
        match parsed {
            RealtimeFrame::Change(parsed) => assert_eq!(parsed, event),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
