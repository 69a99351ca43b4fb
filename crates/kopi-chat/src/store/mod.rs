//! Conversation store: metadata rows plus an append-only message log.
//!
//! Records cross this boundary as explicit typed structs, never loose maps.
//! Two backends implement [`ChatStore`]: a sqlite-backed persistent store
//! ([`sqlite::SqliteChatStore`]) and a volatile in-memory store
//! ([`memory::MemoryChatStore`]) for tests and ephemeral runs.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Author of a persisted message. Exhaustive by design: a turn is either
/// the user's or the bot's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Bot,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Per-conversation metadata row. Topic and stance are committed exactly
/// once, at first-message time, and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub conversation_id: String,
    /// Short phrase naming the debate subject.
    pub topic: String,
    /// Declarative sentence the bot argues for, for the conversation's life.
    pub stance: String,
    pub created_at: DateTime<Utc>,
}

/// Listing projection of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

/// One persisted message in a conversation's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence boundary for conversations and their message logs.
///
/// Implementations must guarantee:
/// - `save_meta` is insert-if-absent: the first committed pair wins and a
///   concurrent second write is silently ignored (first-writer-wins guard
///   for racing first messages on the same conversation id);
/// - message order is creation-time order with ties broken by insertion
///   sequence;
/// - `delete_conversation` cascades to the conversation's messages.
#[cfg_attr(test, mockall::automock)]
pub trait ChatStore: Send + Sync {
    /// Fetch the committed metadata for a conversation, if any.
    fn get_meta(&self, conversation_id: &str) -> Result<Option<ConversationMeta>, StoreError>;

    /// Commit the topic/stance pair for a conversation. No-op if a row
    /// already exists for this id.
    fn save_meta(
        &self,
        conversation_id: &str,
        topic: &str,
        stance: &str,
    ) -> Result<(), StoreError>;

    /// Append a message to the conversation log.
    fn save_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Fetch up to `limit` messages for a conversation. `descending` selects
    /// the most-recent-first window; otherwise the oldest messages come
    /// first.
    fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// List all conversations, newest first.
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Delete a conversation and (cascading) all of its messages.
    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_roundtrip() {
        assert_eq!("user".parse::<MessageRole>().unwrap(), MessageRole::User);
        assert_eq!("bot".parse::<MessageRole>().unwrap(), MessageRole::Bot);
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Bot.to_string(), "bot");
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        let err = "system".parse::<MessageRole>().unwrap_err();
        assert!(err.contains("unknown message role"));
    }

    #[test]
    fn test_stored_message_serde() {
        let msg = StoredMessage {
            id: "m-1".to_string(),
            conversation_id: "c-1".to_string(),
            role: MessageRole::Bot,
            content: "I disagree".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: StoredMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, MessageRole::Bot);
        assert_eq!(parsed.content, "I disagree");
    }
}
