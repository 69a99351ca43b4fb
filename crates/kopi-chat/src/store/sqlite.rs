//! Sqlite-backed conversation store.
//!
//! One connection behind a mutex, WAL mode, foreign keys on. Message order
//! relies on a monotonic `seq` rowid as the tiebreaker for equal timestamps;
//! timestamps are stored as fixed-width RFC 3339 so lexicographic and
//! chronological order agree.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{ChatStore, ConversationMeta, ConversationSummary, MessageRole, StoreError, StoredMessage};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    topic           TEXT NOT NULL,
    stance          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL,
    conversation_id TEXT NOT NULL
        REFERENCES conversations(conversation_id) ON DELETE CASCADE,
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON chat_messages(conversation_id, created_at, seq);
";

/// Persistent [`ChatStore`] over a single sqlite database file.
pub struct SqliteChatStore {
    conn: Mutex<Connection>,
}

impl SqliteChatStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

fn encode_time(ts: DateTime<Utc>) -> String {
    // Fixed fractional width keeps text order == time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn message_from_row(row: &Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    let role_raw: String = row.get(2)?;
    let role: MessageRole = role_raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    let created_raw: String = row.get(4)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: decode_time(&created_raw)?,
    })
}

impl ChatStore for SqliteChatStore {
    fn get_meta(&self, conversation_id: &str) -> Result<Option<ConversationMeta>, StoreError> {
        let conn = self.lock()?;
        let meta = conn
            .query_row(
                "SELECT conversation_id, topic, stance, created_at
                 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| {
                    let created_raw: String = row.get(3)?;
                    Ok(ConversationMeta {
                        conversation_id: row.get(0)?,
                        topic: row.get(1)?,
                        stance: row.get(2)?,
                        created_at: decode_time(&created_raw)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    fn save_meta(
        &self,
        conversation_id: &str,
        topic: &str,
        stance: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        // INSERT OR IGNORE: first committed pair wins; a racing second
        // extraction for the same fresh id is discarded.
        conn.execute(
            "INSERT OR IGNORE INTO conversations (conversation_id, topic, stance, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, topic, stance, encode_time(Utc::now())],
        )?;
        Ok(())
    }

    fn save_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.conversation_id,
                message.role.as_str(),
                message.content,
                encode_time(message.created_at)
            ],
        )?;
        Ok(message)
    }

    fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let conn = self.lock()?;
        let sql = if descending {
            "SELECT id, conversation_id, role, content, created_at
             FROM chat_messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, seq DESC LIMIT ?2"
        } else {
            "SELECT id, conversation_id, role, content, created_at
             FROM chat_messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, seq ASC LIMIT ?2"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![conversation_id, limit as i64], message_from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, topic, created_at
             FROM conversations ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let created_raw: String = row.get(2)?;
            Ok(ConversationSummary {
                conversation_id: row.get(0)?,
                topic: row.get(1)?,
                created_at: decode_time(&created_raw)?,
            })
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        // Messages go with it via ON DELETE CASCADE.
        conn.execute(
            "DELETE FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }
}
