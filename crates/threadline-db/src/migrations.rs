use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Id of the channel seeded on first start.
pub const GENERAL_CHANNEL_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            full_name       TEXT,
            title           TEXT,
            avatar_url      TEXT,
            last_seen_at    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            kind        TEXT NOT NULL CHECK (kind IN ('public', 'private', 'direct')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            channel_id          TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id             TEXT REFERENCES profiles(id) ON DELETE SET NULL,
            parent_message_id   TEXT REFERENCES messages(id) ON DELETE CASCADE,
            content             TEXT NOT NULL,
            attachments         TEXT NOT NULL DEFAULT '[]',
            embedding           BLOB,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_message_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS file_chunks (
            id              TEXT PRIMARY KEY,
            message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            attachment_id   TEXT NOT NULL,
            file_path       TEXT NOT NULL,
            file_name       TEXT NOT NULL,
            file_type       TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL,
            content         TEXT NOT NULL,
            embedding       BLOB NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(attachment_id, chunk_index)
        );

        CREATE TABLE IF NOT EXISTS uploads (
            path        TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            file_name   TEXT NOT NULL,
            size        INTEGER NOT NULL,
            sha256      TEXT NOT NULL,
            message_id  TEXT REFERENCES messages(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_uploads_message
            ON uploads(message_id);

        CREATE INDEX IF NOT EXISTS idx_file_chunks_message
            ON file_chunks(message_id);

        -- Seed the default general channel
        INSERT OR IGNORE INTO channels (id, name, kind, created_at, updated_at)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general', 'public',
                    '1970-01-01T00:00:00.000000Z', '1970-01-01T00:00:00.000000Z');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
