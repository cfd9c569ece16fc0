use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            user_lo             TEXT NOT NULL,
            user_hi             TEXT NOT NULL,
            last_message_text   TEXT NOT NULL,
            last_message_sender TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE (user_lo, user_hi)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_user_lo
            ON conversations(user_lo, updated_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_user_hi
            ON conversations(user_hi, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            text            TEXT NOT NULL,
            attachment_url  TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
