use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use threadline_types::events::{ChangeEvent, ChangeKind};

use crate::error::SyncError;
use crate::session::SessionState;
use crate::tree::Applied;

/// Applies realtime changes to the tree of one session generation.
///
/// Change payloads only identify rows; the full message or reaction set is
/// always re-fetched from the backend before it is applied.
pub(crate) struct Ingestor {
    state: Arc<SessionState>,
    generation: u64,
}

impl Ingestor {
    pub(crate) fn new(state: Arc<SessionState>, generation: u64) -> Self {
        Self { state, generation }
    }

    /// Consume `events` in order until the stream ends, the task is aborted
    /// or the session moves to another channel.
    pub(crate) fn spawn(self, mut events: BoxStream<'static, ChangeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match self.handle_event(event).await {
                    Ok(_) => {}
                    Err(SyncError::Superseded) => break,
                    Err(e) => warn!("Failed to apply realtime change: {}", e),
                }
            }
            debug!("Change stream for generation {} closed", self.generation);
        })
    }

    pub(crate) async fn handle_event(&self, event: ChangeEvent) -> Result<Applied, SyncError> {
        match event {
            ChangeEvent::Messages {
                event: ChangeKind::Delete,
                old,
                ..
            } => {
                let Some(old) = old else {
                    return Ok(Applied::Missing);
                };
                self.apply(move |tree| tree.apply_delete(old.id)).await
            }
            ChangeEvent::Messages { event, old, new } => {
                let Some(changed) = new.or(old) else {
                    return Ok(Applied::Missing);
                };
                let Some(record) = self.state.backend.fetch_message(changed.id).await? else {
                    debug!("Message {} vanished before it could be applied", changed.id);
                    return Ok(Applied::Missing);
                };
                let message = record.into_message();
                self.apply(move |tree| {
                    if tree.channel_id() != Some(message.channel_id) {
                        return Applied::Missing;
                    }
                    match event {
                        ChangeKind::Insert => tree.apply_insert(message),
                        _ => tree.apply_update(message),
                    }
                })
                .await
            }
            ChangeEvent::Reactions { old, new, .. } => {
                let Some(row) = new.or(old) else {
                    return Ok(Applied::Missing);
                };
                // Reactions are unfiltered, most belong to other channels
                if !self.state.tree.lock().await.contains(row.message_id) {
                    return Ok(Applied::Missing);
                }
                let rows = self.state.backend.fetch_reactions(row.message_id).await?;
                self.apply(move |tree| tree.apply_reaction_change(row.message_id, &rows))
                    .await
            }
        }
    }

    async fn apply<F>(&self, mutate: F) -> Result<Applied, SyncError>
    where
        F: FnOnce(&mut crate::tree::MessageTree) -> Applied,
    {
        self.state
            .apply(self.generation, mutate)
            .await
            .ok_or(SyncError::Superseded)
    }
}
