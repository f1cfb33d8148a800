use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use threadline_types::models::{
    Attachment, Author, Channel, ChannelKind, MessageRecord, Profile, RawReaction,
    channel_name_for,
};
use uuid::Uuid;

use crate::Database;
use crate::models::{
    FileChunkMatch, NewFileChunk, NewMessage, NewUpload, PendingEmbedding, ScoredMessage,
    UnclaimedUpload,
};
use crate::vectors;

const MESSAGE_COLUMNS: &str = "m.id, m.channel_id, m.user_id, m.parent_message_id, m.content, \
     m.attachments, m.created_at, m.updated_at, p.username";

const PROFILE_COLUMNS: &str =
    "id, username, full_name, title, avatar_url, last_seen_at, created_at, updated_at";

impl Database {
    // -- Profiles --

    /// Create the profile on first sight and refresh `last_seen_at`.
    pub fn touch_profile(&self, id: Uuid, username: &str) -> Result<()> {
        let now = timestamp(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, username, last_seen_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
                params![id.to_string(), username, now],
            )?;
            Ok(())
        })
    }

    pub fn update_profile_details(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        title: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        let now = timestamp(&Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE profiles SET full_name = ?2, title = ?3, avatar_url = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![id.to_string(), full_name, title, avatar_url, now],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], map_profile).optional()
        })
    }

    pub fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id IN ({})",
                placeholders.join(", ")
            );
            let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(keys.iter()), map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring match on username or full name. Exact
    /// username matches rank first, then prefix matches.
    pub fn search_profiles(&self, query: &str, limit: u32) -> Result<Vec<Profile>> {
        let pattern = format!("%{}%", escape_like(query));
        let prefix = format!("{}%", escape_like(query));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles
                 WHERE username LIKE ?1 ESCAPE '\\' OR full_name LIKE ?1 ESCAPE '\\'
                 ORDER BY CASE
                     WHEN lower(username) = lower(?2) THEN 0
                     WHEN username LIKE ?3 ESCAPE '\\' THEN 1
                     ELSE 2
                 END, username
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, query, prefix, limit], map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Channels --

    pub fn create_channel(&self, name: &str, kind: ChannelKind) -> Result<Channel> {
        let id = Uuid::new_v4();
        let now = timestamp(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name, kind, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.to_string(), name, kind.as_str(), now],
            )?;
            query_channel(conn, id)?.ok_or_else(|| anyhow!("Channel vanished after insert: {}", id))
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        self.with_conn(|conn| query_channel(conn, id))
    }

    /// Public and private channels, by name. Direct channels are reached
    /// through their participants instead.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, created_at, updated_at FROM channels
                 WHERE kind != 'direct' ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Find the direct channel between two users, creating it if needed.
    /// The channel name is derived from the sorted pair, so both sides
    /// resolve to the same row.
    pub fn find_or_create_direct_channel(&self, a: Uuid, b: Uuid) -> Result<Channel> {
        let name = channel_name_for(a, b);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    "SELECT id, name, kind, created_at, updated_at FROM channels WHERE name = ?1",
                    [&name],
                    map_channel,
                )
                .optional()?;

            let channel = match existing {
                Some(channel) => channel,
                None => {
                    let id = Uuid::new_v4();
                    let now = timestamp(&Utc::now());
                    tx.execute(
                        "INSERT INTO channels (id, name, kind, created_at, updated_at)
                         VALUES (?1, ?2, 'direct', ?3, ?3)",
                        params![id.to_string(), name, now],
                    )?;
                    query_channel(&tx, id)?
                        .ok_or_else(|| anyhow!("Channel vanished after insert: {}", id))?
                }
            };
            tx.commit()?;
            Ok(channel)
        })
    }

    // -- Messages --

    /// Insert a message and claim the uploads it lists. Only uploads the
    /// author owns and no other message has claimed change hands; anything
    /// else stays on the message as display data but is never cleaned up
    /// through it.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<MessageRecord> {
        let now = timestamp(&Utc::now());
        let attachments = serde_json::to_string(&msg.attachments)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages
                     (id, channel_id, user_id, parent_message_id, content, attachments, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    msg.id.to_string(),
                    msg.channel_id.to_string(),
                    msg.user_id.to_string(),
                    msg.parent_message_id.map(|p| p.to_string()),
                    msg.content,
                    attachments,
                    now,
                ],
            )?;
            for attachment in &msg.attachments {
                tx.execute(
                    "UPDATE uploads SET message_id = ?1
                     WHERE path = ?2 AND owner_id = ?3 AND message_id IS NULL",
                    params![msg.id.to_string(), attachment.id, msg.user_id.to_string()],
                )?;
            }
            let record = query_message(&tx, msg.id)?
                .ok_or_else(|| anyhow!("Message vanished after insert: {}", msg.id))?;
            tx.commit()?;
            Ok(record)
        })
    }

    /// A single message with its author and raw reactions. Replies are not
    /// included.
    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRecord>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn get_replies(&self, parent_id: Uuid) -> Result<Vec<MessageRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 LEFT JOIN profiles p ON m.user_id = p.id
                 WHERE m.parent_message_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut replies = stmt
                .query_map([parent_id.to_string()], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_reactions(conn, &mut replies)?;
            Ok(replies)
        })
    }

    /// All top-level messages of a channel, oldest first, each carrying its
    /// replies (oldest first) and every message carrying raw reactions.
    pub fn get_channel_messages(&self, channel_id: Uuid) -> Result<Vec<MessageRecord>> {
        self.with_conn(|conn| {
            // JOIN profiles to fetch the author in a single query (eliminates N+1)
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 LEFT JOIN profiles p ON m.user_id = p.id
                 WHERE m.channel_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map([channel_id.to_string()], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_reactions(conn, &mut rows)?;

            let mut replies: HashMap<Uuid, Vec<MessageRecord>> = HashMap::new();
            let mut top_level = Vec::new();
            for row in rows {
                match row.parent_message_id {
                    Some(parent) => replies.entry(parent).or_default().push(row),
                    None => top_level.push(row),
                }
            }
            for message in &mut top_level {
                message.replies = replies.remove(&message.id).unwrap_or_default();
            }
            Ok(top_level)
        })
    }

    /// Edit message content. Reactions and replies are untouched.
    pub fn update_message_content(&self, id: Uuid, content: &str) -> Result<Option<MessageRecord>> {
        let now = timestamp(&Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, embedding = NULL, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), content, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_message(conn, id)
        })
    }

    /// Delete a message. Replies, reactions, file chunks and upload claims go
    /// with it. Returns the blob paths the thread owned, or `None` when the
    /// message did not exist.
    pub fn delete_message(&self, id: Uuid) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let paths = {
                let mut stmt = tx.prepare(
                    "SELECT u.path FROM uploads u
                     JOIN messages m ON u.message_id = m.id
                     WHERE m.id = ?1 OR m.parent_message_id = ?1
                     ORDER BY u.created_at",
                )?;
                let paths = stmt
                    .query_map([id.to_string()], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                paths
            };
            let deleted = tx.execute("DELETE FROM messages WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok((deleted > 0).then_some(paths))
        })
    }

    // -- Uploads --

    pub fn record_upload(&self, upload: &NewUpload) -> Result<()> {
        let now = timestamp(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO uploads (path, owner_id, file_name, size, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    upload.path,
                    upload.owner_id.to_string(),
                    upload.file_name,
                    upload.size as i64,
                    upload.sha256,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// The subset of `paths` that `owner` uploaded and no message has
    /// claimed yet.
    pub fn unclaimed_uploads(&self, owner: Uuid, paths: &[String]) -> Result<Vec<UnclaimedUpload>> {
        if paths.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=paths.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT path, file_name FROM uploads
                 WHERE owner_id = ?1 AND message_id IS NULL AND path IN ({})",
                placeholders.join(", ")
            );
            let mut keys = vec![owner.to_string()];
            keys.extend(paths.iter().cloned());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(keys.iter()), |row| {
                    Ok(UnclaimedUpload {
                        path: row.get(0)?,
                        file_name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes it if the user already applied this emoji,
    /// inserts it otherwise. Runs in one transaction so concurrent toggles
    /// from the same user cannot interleave. Returns true when added.
    pub fn toggle_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<bool> {
        let now = timestamp(&Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id.to_string(), user_id.to_string(), emoji],
            )?;

            let added = if removed == 0 {
                tx.execute(
                    "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        message_id.to_string(),
                        user_id.to_string(),
                        emoji,
                        now,
                    ],
                )?;
                true
            } else {
                false
            };

            tx.commit()?;
            Ok(added)
        })
    }

    pub fn get_reactions(&self, message_id: Uuid) -> Result<Vec<RawReaction>> {
        self.get_reactions_for_messages(&[message_id])
    }

    /// Batch-fetch reactions for a set of message IDs, oldest first.
    pub fn get_reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<RawReaction>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| query_reactions(conn, message_ids))
    }

    // -- Embeddings --

    pub fn set_message_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET embedding = ?2 WHERE id = ?1",
                params![id.to_string(), vectors::encode(embedding)],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn pending_embeddings(&self) -> Result<Vec<PendingEmbedding>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, attachments FROM messages
                 WHERE embedding IS NULL ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PendingEmbedding {
                        id: uuid_col(row, 0)?,
                        content: row.get(1)?,
                        attachments: attachments_col(row, 2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replace all chunks stored for one attachment.
    pub fn replace_file_chunks(&self, attachment_id: &str, chunks: &[NewFileChunk]) -> Result<()> {
        let now = timestamp(&Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM file_chunks WHERE attachment_id = ?1", [attachment_id])?;
            for chunk in chunks {
                tx.execute(
                    "INSERT INTO file_chunks
                         (id, message_id, attachment_id, file_path, file_name, file_type,
                          chunk_index, content, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        Uuid::new_v4().to_string(),
                        chunk.message_id.to_string(),
                        chunk.attachment_id,
                        chunk.file_path,
                        chunk.file_name,
                        chunk.file_type,
                        chunk.chunk_index as i64,
                        chunk.content,
                        vectors::encode(&chunk.embedding),
                        now,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Messages ranked by cosine similarity to `embedding`, best first.
    pub fn search_messages(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, embedding FROM messages WHERE embedding IS NOT NULL")?;
            let candidates = stmt
                .query_map([], |row| Ok((uuid_col(row, 0)?, row.get::<_, Vec<u8>>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ranked = rank_by_similarity(
                candidates.into_iter().map(|(id, blob)| (id, vectors::decode(&blob))),
                embedding,
                threshold,
                limit,
            );

            let mut results = Vec::with_capacity(ranked.len());
            for (id, similarity) in ranked {
                if let Some(record) = query_message(conn, id)? {
                    results.push(ScoredMessage { record, similarity });
                }
            }
            Ok(results)
        })
    }

    /// File chunks ranked by cosine similarity to `embedding`, best first.
    /// Several chunks of the same file may appear.
    pub fn search_file_chunks(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<FileChunkMatch>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.rowid, c.embedding FROM file_chunks c",
            )?;
            let candidates = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ranked = rank_by_similarity(
                candidates.into_iter().map(|(rowid, blob)| (rowid, vectors::decode(&blob))),
                embedding,
                threshold,
                limit,
            );

            let mut stmt = conn.prepare(
                "SELECT c.message_id, c.attachment_id, c.file_path, c.file_name, c.file_type,
                        c.chunk_index, c.created_at, p.username
                 FROM file_chunks c
                 JOIN messages m ON c.message_id = m.id
                 LEFT JOIN profiles p ON m.user_id = p.id
                 WHERE c.rowid = ?1",
            )?;
            let mut results = Vec::with_capacity(ranked.len());
            for (rowid, similarity) in ranked {
                let found = stmt
                    .query_row([rowid], |row| {
                        Ok(FileChunkMatch {
                            message_id: uuid_col(row, 0)?,
                            attachment_id: row.get(1)?,
                            file_path: row.get(2)?,
                            file_name: row.get(3)?,
                            file_type: row.get(4)?,
                            chunk_index: row.get::<_, i64>(5)? as usize,
                            shared_at: timestamp_col(row, 6)?,
                            shared_by: row.get(7)?,
                            similarity,
                        })
                    })
                    .optional()?;
                results.extend(found);
            }
            Ok(results)
        })
    }
}

fn rank_by_similarity<K>(
    candidates: impl Iterator<Item = (K, Vec<f32>)>,
    query: &[f32],
    threshold: f32,
    limit: usize,
) -> Vec<(K, f32)> {
    let mut scored: Vec<(K, f32)> = candidates
        .map(|(key, vector)| {
            let similarity = vectors::cosine_similarity(query, &vector);
            (key, similarity)
        })
        .filter(|(_, similarity)| *similarity >= threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}

fn query_channel(conn: &Connection, id: Uuid) -> Result<Option<Channel>> {
    conn.query_row(
        "SELECT id, name, kind, created_at, updated_at FROM channels WHERE id = ?1",
        [id.to_string()],
        map_channel,
    )
    .optional()
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<MessageRecord>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m
         LEFT JOIN profiles p ON m.user_id = p.id
         WHERE m.id = ?1"
    );
    let message = conn.query_row(&sql, [id.to_string()], map_message).optional()?;
    match message {
        Some(mut message) => {
            message.reactions = query_reactions(conn, &[id])?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

fn query_reactions(conn: &Connection, message_ids: &[Uuid]) -> Result<Vec<RawReaction>> {
    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, user_id, emoji FROM reactions WHERE message_id IN ({})
         ORDER BY created_at ASC, rowid ASC",
        placeholders.join(", ")
    );
    let keys: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(keys.iter()), |row| {
            Ok(RawReaction {
                message_id: uuid_col(row, 0)?,
                user_id: uuid_col(row, 1)?,
                emoji: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn attach_reactions(conn: &Connection, messages: &mut [MessageRecord]) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
    let mut by_message: HashMap<Uuid, Vec<RawReaction>> = HashMap::new();
    for reaction in query_reactions(conn, &ids)? {
        by_message.entry(reaction.message_id).or_default().push(reaction);
    }
    for message in messages {
        message.reactions = by_message.remove(&message.id).unwrap_or_default();
    }
    Ok(())
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let user_id = opt_uuid_col(row, 2)?;
    let username: Option<String> = row.get(8)?;
    let user = match (user_id, username) {
        (Some(id), Some(username)) => Some(Author { id, username }),
        _ => None,
    };
    Ok(MessageRecord {
        id: uuid_col(row, 0)?,
        channel_id: uuid_col(row, 1)?,
        user_id,
        parent_message_id: opt_uuid_col(row, 3)?,
        content: row.get(4)?,
        attachments: attachments_col(row, 5)?,
        created_at: timestamp_col(row, 6)?,
        updated_at: timestamp_col(row, 7)?,
        user,
        reactions: vec![],
        replies: vec![],
    })
}

fn map_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let kind: String = row.get(2)?;
    Ok(Channel {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        kind: ChannelKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown channel kind: {}", kind).into(),
            )
        })?,
        created_at: timestamp_col(row, 3)?,
        updated_at: timestamp_col(row, 4)?,
    })
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        title: row.get(3)?,
        avatar_url: row.get(4)?,
        last_seen_at: opt_timestamp_col(row, 5)?,
        created_at: timestamp_col(row, 6)?,
        updated_at: timestamp_col(row, 7)?,
    })
}

/// Fixed-width RFC 3339 so that TEXT ordering matches time ordering.
pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e))).transpose()
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn attachments_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<Attachment>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
