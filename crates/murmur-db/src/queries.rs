use crate::models::{ConversationRow, MessageRow};
use crate::{Database, now_utc};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

/// Canonical storage order for an unordered participant pair.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Database {
    // -- Conversations --

    /// Find the conversation for an unordered pair, creating it with the
    /// seeded summary if absent. The UNIQUE(user_lo, user_hi) key makes
    /// concurrent first messages converge on one row: a losing insert is a
    /// no-op and the re-select returns the winner.
    pub fn find_or_create_conversation(
        &self,
        id: &str,
        user_a: &str,
        user_b: &str,
        seed_text: &str,
        seed_sender: &str,
    ) -> Result<ConversationRow> {
        self.with_conn(|conn| {
            let (lo, hi) = pair_key(user_a, user_b);

            if let Some(row) = query_conversation_by_pair(conn, lo, hi)? {
                return Ok(row);
            }

            let now = now_utc();
            conn.execute(
                "INSERT INTO conversations
                    (id, user_lo, user_hi, last_message_text, last_message_sender, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(user_lo, user_hi) DO NOTHING",
                rusqlite::params![id, lo, hi, seed_text, seed_sender, now],
            )?;

            query_conversation_by_pair(conn, lo, hi)?
                .ok_or_else(|| anyhow!("conversation missing after insert: {}/{}", lo, hi))
        })
    }

    /// Unconditional last-writer-wins overwrite of the summary.
    pub fn update_conversation_summary(&self, id: &str, text: &str, sender: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations
                 SET last_message_text = ?2, last_message_sender = ?3, updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, text, sender, now_utc()],
            )?;
            Ok(())
        })
    }

    /// Read-path lookup with no side effects.
    pub fn conversation_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let (lo, hi) = pair_key(user_a, user_b);
            query_conversation_by_pair(conn, lo, hi)
        })
    }

    /// All conversations containing the user, newest activity first.
    pub fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_lo, user_hi, last_message_text, last_message_sender, created_at, updated_at
                 FROM conversations
                 WHERE user_lo = ?1 OR user_hi = ?1
                 ORDER BY updated_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message. The store assigns created_at and the insertion
    /// sequence; rows are immutable once written.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        attachment_url: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let now = now_utc();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, text, attachment_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, sender_id, text, attachment_url, now],
            )?;

            Ok(MessageRow {
                seq: conn.last_insert_rowid(),
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                text: text.to_string(),
                attachment_url: attachment_url.map(|s| s.to_string()),
                created_at: now,
            })
        })
    }

    /// Snapshot of a conversation's history, ascending by created_at with
    /// insertion order breaking ties. Safe to call repeatedly for polling.
    pub fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, conversation_id, sender_id, text, attachment_url, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, seq ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        conversation_id: row.get(2)?,
                        sender_id: row.get(3)?,
                        text: row.get(4)?,
                        attachment_url: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_conversation_by_pair(
    conn: &Connection,
    lo: &str,
    hi: &str,
) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_lo, user_hi, last_message_text, last_message_sender, created_at, updated_at
         FROM conversations
         WHERE user_lo = ?1 AND user_hi = ?2",
    )?;

    let row = stmt.query_row([lo, hi], conversation_from_row).optional()?;

    Ok(row)
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_lo: row.get(1)?,
        user_hi: row.get(2)?,
        last_message_text: row.get(3)?,
        last_message_sender: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
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
