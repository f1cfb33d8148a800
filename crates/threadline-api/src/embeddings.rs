use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use threadline_db::models::NewFileChunk;
use threadline_types::api::{EmbedRequest, EmbedResponse};
use threadline_types::models::Attachment;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

pub const CHUNK_SIZE: usize = 1000;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "log", "rs", "ts", "js", "py", "html", "xml", "yaml", "toml",
];

/// POST /embeddings: embed one message, or backfill every message that has
/// no embedding yet.
pub async fn create_embeddings(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<EmbedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let embedded = match req.message_id {
        Some(message_id) => {
            let record = with_db(&state, move |db| db.get_message(message_id))
                .await?
                .ok_or(ApiError::NotFound)?;
            embed_message(&state, record.id, &record.content, &record.attachments).await?;
            1
        }
        None => {
            let pending = with_db(&state, |db| db.pending_embeddings()).await?;
            let mut embedded = 0;
            for message in pending {
                match embed_message(&state, message.id, &message.content, &message.attachments)
                    .await
                {
                    Ok(()) => embedded += 1,
                    Err(e) => warn!("Backfill skipped message {}: {}", message.id, e),
                }
            }
            info!("Backfilled {} message embeddings", embedded);
            embedded
        }
    };

    Ok(Json(EmbedResponse {
        success: true,
        embedded,
    }))
}

/// Store the message vector, then chunk and embed its text attachments.
/// Attachment failures are logged and never fail the message itself.
async fn embed_message(
    state: &AppState,
    message_id: Uuid,
    content: &str,
    attachments: &[Attachment],
) -> Result<(), ApiError> {
    let text = embedding_text(content, attachments);
    if text.is_empty() {
        return Err(ApiError::validation("message has nothing to embed"));
    }

    let vector = state.embedder.embed(&text).await.map_err(ApiError::Embedding)?;
    with_db(state, move |db| db.set_message_embedding(message_id, &vector)).await?;
    debug!("Embedded message {}", message_id);

    for attachment in attachments.iter().filter(|a| is_text_file(&a.name)) {
        if let Err(e) = embed_attachment(state, message_id, attachment).await {
            warn!("Skipping chunks for attachment {}: {}", attachment.id, e);
        }
    }
    Ok(())
}

async fn embed_attachment(
    state: &AppState,
    message_id: Uuid,
    attachment: &Attachment,
) -> Result<(), ApiError> {
    let bytes = state.storage.read(&attachment.id).await?;
    let text = String::from_utf8_lossy(&bytes);

    let mut chunks = Vec::new();
    for (chunk_index, content) in chunk_text(&text, CHUNK_SIZE).into_iter().enumerate() {
        let embedding = state.embedder.embed(&content).await.map_err(ApiError::Embedding)?;
        chunks.push(NewFileChunk {
            message_id,
            attachment_id: attachment.id.clone(),
            file_path: attachment.url.clone(),
            file_name: attachment.name.clone(),
            file_type: file_type(&attachment.name),
            chunk_index,
            content,
            embedding,
        });
    }

    let attachment_id = attachment.id.clone();
    let count = chunks.len();
    with_db(state, move |db| db.replace_file_chunks(&attachment_id, &chunks)).await?;
    debug!("Stored {} chunks for attachment {}", count, attachment.id);
    Ok(())
}

/// Message content, or the attachment names for attachment-only messages.
fn embedding_text(content: &str, attachments: &[Attachment]) -> String {
    let content = content.trim();
    if !content.is_empty() {
        return content.to_string();
    }
    attachments
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split into pieces of at most `size` characters. Blank input yields no
/// chunks.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if text.trim().is_empty() || size == 0 {
        return vec![];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

pub fn is_text_file(name: &str) -> bool {
    TEXT_EXTENSIONS.contains(&file_type(name).as_str())
}

/// Lowercased extension, or "file" when there is none.
pub fn file_type(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => "file".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_split_on_character_boundaries() {
        let text = "é".repeat(2500);
        let chunks = chunk_text(&text, CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[2].chars().count(), 500);
        assert!(chunk_text("   \n", CHUNK_SIZE).is_empty());
    }

    #[test]
    fn text_files_are_detected_by_extension() {
        assert!(is_text_file("notes.MD"));
        assert!(is_text_file("main.rs"));
        assert!(!is_text_file("photo.png"));
        assert!(!is_text_file("README"));
        assert!(!is_text_file(".txt"));
        assert_eq!(file_type("Report.PDF"), "pdf");
    }

    #[test]
    fn attachment_only_messages_embed_their_file_names() {
        let attachments = vec![Attachment {
            id: "u/abc-plan.txt".into(),
            name: "plan.txt".into(),
            url: "http://localhost/attachments/u/abc-plan.txt".into(),
        }];
        assert_eq!(embedding_text("  ", &attachments), "plan.txt");
        assert_eq!(embedding_text("hello", &attachments), "hello");
    }
}
