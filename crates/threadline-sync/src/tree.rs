use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use threadline_types::models::{Message, MessageRecord, RawReaction};
use threadline_types::reactions::aggregate;

/// What a mutation did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    /// A reply whose parent is not (or not as a top-level message) in the
    /// tree.
    Dropped,
    /// The id is not in the tree; nothing changed.
    Missing,
    /// The message was already present and was left as it is.
    Unchanged,
}

impl Applied {
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated | Self::Removed)
    }
}

struct Node {
    /// Stored with an empty `replies`; the nested view is built on demand.
    message: Message,
    replies: Vec<Uuid>,
}

/// In-memory mirror of one channel: an arena of messages keyed by id plus
/// the ordered top-level index. Replies are one level deep and each top-level
/// node keeps its own ordered reply ids.
///
/// Every mutation is idempotent, so duplicate realtime delivery is harmless.
#[derive(Default)]
pub struct MessageTree {
    channel_id: Option<Uuid>,
    nodes: HashMap<Uuid, Node>,
    top_level: Vec<Uuid>,
}

impl MessageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_id(&self) -> Option<Uuid> {
        self.channel_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// A stored message without its replies.
    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.nodes.get(&id).map(|n| &n.message)
    }

    pub fn clear(&mut self) {
        self.channel_id = None;
        self.nodes.clear();
        self.top_level.clear();
    }

    /// Replace the whole tree with a channel load. Top-level messages are
    /// ordered by `created_at`; replies keep the order they arrive in.
    pub fn load(&mut self, channel_id: Uuid, records: Vec<MessageRecord>) {
        self.clear();
        self.channel_id = Some(channel_id);

        let mut records = records;
        records.sort_by_key(|r| r.created_at);

        let mut orphans = Vec::new();
        for mut record in records {
            let replies = std::mem::take(&mut record.replies);
            if record.is_top_level() {
                self.apply_insert(record.into_message());
            } else {
                orphans.push(record);
            }
            for reply in replies {
                self.apply_insert(reply.into_message());
            }
        }
        // Replies delivered flat rather than nested
        for record in orphans {
            self.apply_insert(record.into_message());
        }
        debug!(
            "Loaded channel {}: {} top-level, {} total",
            channel_id,
            self.top_level.len(),
            self.nodes.len()
        );
    }

    /// Add a message. A duplicate id is treated as an update. A reply whose
    /// parent is unknown or is itself a reply is dropped.
    pub fn apply_insert(&mut self, mut message: Message) -> Applied {
        if self.nodes.contains_key(&message.id) {
            return self.apply_update(message);
        }

        let nested = std::mem::take(&mut message.replies);
        let id = message.id;
        let parent = message.parent_message_id;
        match parent {
            None => {
                self.nodes.insert(id, Node { message, replies: Vec::new() });
                self.top_level.push(id);
            }
            Some(parent_id) => {
                let parent_is_top_level = self
                    .nodes
                    .get(&parent_id)
                    .is_some_and(|p| p.message.parent_message_id.is_none());
                if !parent_is_top_level {
                    debug!("Dropping reply {} to unknown parent {}", id, parent_id);
                    return Applied::Dropped;
                }
                self.nodes.insert(id, Node { message, replies: Vec::new() });
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.replies.push(id);
                }
            }
        }

        for reply in nested {
            self.apply_insert(reply);
        }
        Applied::Inserted
    }

    /// Replace a stored message in place, reactions included. Its position
    /// and reply list stay.
    pub fn apply_update(&mut self, mut message: Message) -> Applied {
        let Some(node) = self.nodes.get_mut(&message.id) else {
            return Applied::Missing;
        };

        // Threading is fixed at insert time
        message.parent_message_id = node.message.parent_message_id;
        let nested = std::mem::take(&mut message.replies);
        node.message = message;

        for reply in nested {
            self.apply_insert(reply);
        }
        Applied::Updated
    }

    /// Remove a message. A top-level message takes its replies with it.
    pub fn apply_delete(&mut self, id: Uuid) -> Applied {
        let Some(node) = self.nodes.remove(&id) else {
            return Applied::Missing;
        };

        match node.message.parent_message_id {
            None => {
                self.top_level.retain(|m| *m != id);
                for reply in node.replies {
                    self.nodes.remove(&reply);
                }
            }
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.replies.retain(|r| *r != id);
                }
            }
        }
        Applied::Removed
    }

    /// Recompute the aggregated reactions of one message from its raw rows.
    pub fn apply_reaction_change(&mut self, message_id: Uuid, rows: &[RawReaction]) -> Applied {
        match self.nodes.get_mut(&message_id) {
            Some(node) => {
                node.message.reactions = aggregate(rows);
                Applied::Updated
            }
            None => Applied::Missing,
        }
    }

    /// The nested view for rendering: top-level messages in order, each with
    /// its replies in order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.top_level
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| {
                let mut message = node.message.clone();
                message.replies = node
                    .replies
                    .iter()
                    .filter_map(|r| self.nodes.get(r))
                    .map(|r| r.message.clone())
                    .collect();
                message
            })
            .collect()
    }
}
