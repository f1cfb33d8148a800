use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RawReaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<Uuid>,
}

/// Group raw reaction rows by emoji.
///
/// Emojis keep the order in which they were first seen and users keep row
/// order. `count` is always `users.len()`.
pub fn aggregate(rows: &[RawReaction]) -> Vec<ReactionSummary> {
    let mut summaries: Vec<ReactionSummary> = Vec::new();
    for row in rows {
        match summaries.iter_mut().find(|s| s.emoji == row.emoji) {
            Some(summary) => {
                summary.users.push(row.user_id);
                summary.count = summary.users.len();
            }
            None => summaries.push(ReactionSummary {
                emoji: row.emoji.clone(),
                count: 1,
                users: vec![row.user_id],
            }),
        }
    }
    summaries
}
