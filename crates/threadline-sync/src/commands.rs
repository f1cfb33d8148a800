use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use threadline_types::api::SendMessageRequest;
use threadline_types::models::{Attachment, Message};

use crate::backend::OutgoingFile;
use crate::error::{SyncError, ValidationError};
use crate::session::ChannelSession;
use crate::tree::Applied;

/// Largest attachment accepted for upload.
pub const MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

/// Result of a send. Attachments that could not be included are reported
/// here; they never fail the send itself.
#[derive(Debug)]
pub struct SendOutcome {
    pub message: Message,
    /// Files refused before upload, one error each.
    pub rejected: Vec<ValidationError>,
    /// Names of files whose upload failed.
    pub failed_uploads: Vec<String>,
}

impl ChannelSession {
    /// Post a message to the open channel, optionally as a reply.
    ///
    /// Oversized files are rejected up front and the rest are uploaded in
    /// parallel before the message is inserted. Embedding generation for
    /// the new message runs in the background and its failure is only
    /// logged.
    pub async fn send_message(
        &self,
        content: &str,
        files: Vec<OutgoingFile>,
        reply_to: Option<Uuid>,
    ) -> Result<SendOutcome, SyncError> {
        let channel_id = self.channel_id().await.ok_or(SyncError::NoChannel)?;
        let generation = self.generation();
        let has_text = !content.trim().is_empty();

        let (accepted, oversized): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|f| f.size() <= MAX_ATTACHMENT_BYTES);
        let rejected: Vec<ValidationError> = oversized
            .into_iter()
            .map(|f| ValidationError::FileTooLarge {
                size: f.size(),
                name: f.name,
                limit: MAX_ATTACHMENT_BYTES,
            })
            .collect();
        for error in &rejected {
            warn!("Not attaching file: {}", error);
        }

        if !has_text && accepted.is_empty() {
            return Err(nothing_to_send(rejected).into());
        }

        let backend = &self.state.backend;
        let uploads = join_all(accepted.into_iter().map(|file| async move {
            let name = file.name.clone();
            (name, backend.upload(file).await)
        }))
        .await;

        let mut attachments: Vec<Attachment> = Vec::new();
        let mut failed_uploads = Vec::new();
        for (name, result) in uploads {
            match result {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => {
                    warn!("Upload of {} failed: {}", name, e);
                    failed_uploads.push(name);
                }
            }
        }

        if !has_text && attachments.is_empty() {
            return Err(nothing_to_send(rejected).into());
        }

        let record = backend
            .insert_message(
                channel_id,
                SendMessageRequest {
                    content: content.to_string(),
                    attachments,
                    parent_message_id: reply_to,
                },
            )
            .await?;
        let message = record.into_message();

        // The realtime echo may have landed first with a fresher copy
        let local = message.clone();
        self.state
            .apply(generation, move |tree| {
                if tree.contains(local.id) {
                    Applied::Unchanged
                } else {
                    tree.apply_insert(local)
                }
            })
            .await;

        let embed_backend = self.state.backend.clone();
        let message_id = message.id;
        tokio::spawn(async move {
            match embed_backend.request_embedding(message_id).await {
                Ok(()) => debug!("Embedding generated for message {}", message_id),
                Err(e) => warn!("Embedding request for message {} failed: {}", message_id, e),
            }
        });

        Ok(SendOutcome {
            message,
            rejected,
            failed_uploads,
        })
    }

    /// Add the caller's `emoji` to a message, or take it away if present.
    /// Returns whether the reaction is present afterwards.
    pub async fn toggle_reaction(&self, message_id: Uuid, emoji: &str) -> Result<bool, SyncError> {
        let generation = self.generation();
        let backend = &self.state.backend;

        let added = backend.toggle_reaction(message_id, emoji.to_string()).await?;
        let rows = backend.fetch_reactions(message_id).await?;
        self.state
            .apply(generation, move |tree| tree.apply_reaction_change(message_id, &rows))
            .await;
        Ok(added)
    }

    /// Delete one of the caller's messages along with its replies. The
    /// server enforces authorship too; the local check only saves a round
    /// trip.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), SyncError> {
        let generation = self.generation();
        {
            let tree = self.state.tree.lock().await;
            let foreign = tree
                .get(message_id)
                .is_some_and(|m| m.user_id != Some(self.user_id()));
            if foreign {
                return Err(SyncError::NotAuthor("delete"));
            }
        }

        self.state.backend.delete_message(message_id).await?;
        self.state
            .apply(generation, move |tree| tree.apply_delete(message_id))
            .await;
        info!("Deleted message {}", message_id);
        Ok(())
    }
}

/// Error for a send left without text or attachments. Size rejections are
/// handed back so the caller can name the offending files.
fn nothing_to_send(rejected: Vec<ValidationError>) -> ValidationError {
    if rejected.is_empty() {
        ValidationError::EmptyMessage
    } else {
        ValidationError::AttachmentsRejected(rejected)
    }
}
