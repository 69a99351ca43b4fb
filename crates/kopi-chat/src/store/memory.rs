//! In-memory conversation store.
//!
//! Volatile [`ChatStore`] used by tests and `--in-memory` runs. Mirrors the
//! sqlite backend's ordering and cascade semantics: messages carry a
//! monotonic insertion sequence as the tiebreaker, and deleting a
//! conversation drops its log.

use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use super::{ChatStore, ConversationMeta, ConversationSummary, MessageRole, StoreError, StoredMessage};

#[derive(Default)]
struct Inner {
    conversations: Vec<ConversationMeta>,
    messages: Vec<(u64, StoredMessage)>,
    next_seq: u64,
}

/// Volatile [`ChatStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryChatStore {
    inner: RwLock<Inner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl ChatStore for MemoryChatStore {
    fn get_meta(&self, conversation_id: &str) -> Result<Option<ConversationMeta>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .conversations
            .iter()
            .find(|c| c.conversation_id == conversation_id)
            .cloned())
    }

    fn save_meta(
        &self,
        conversation_id: &str,
        topic: &str,
        stance: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        // Insert-if-absent: first committed pair wins.
        if inner
            .conversations
            .iter()
            .any(|c| c.conversation_id == conversation_id)
        {
            return Ok(());
        }
        inner.conversations.push(ConversationMeta {
            conversation_id: conversation_id.to_string(),
            topic: topic.to_string(),
            stance: stance.to_string(),
            created_at: Utc::now(),
        });
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
        let mut inner = self.write()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.push((seq, message.clone()));
        Ok(message)
    }

    fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.read()?;
        let mut selected: Vec<(u64, StoredMessage)> = inner
            .messages
            .iter()
            .filter(|(_, m)| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        selected.sort_by(|(seq_a, a), (seq_b, b)| {
            (a.created_at, *seq_a).cmp(&(b.created_at, *seq_b))
        });
        if descending {
            selected.reverse();
        }
        selected.truncate(limit);
        Ok(selected.into_iter().map(|(_, m)| m).collect())
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let inner = self.read()?;
        // Reverse insertion order first so creation-time ties still list
        // the later conversation ahead of the earlier one.
        let mut summaries: Vec<ConversationSummary> = inner
            .conversations
            .iter()
            .rev()
            .map(|c| ConversationSummary {
                conversation_id: c.conversation_id.clone(),
                topic: c.topic.clone(),
                created_at: c.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner
            .conversations
            .retain(|c| c.conversation_id != conversation_id);
        // Manual cascade, matching the sqlite backend's FK behavior.
        inner
            .messages
            .retain(|(_, m)| m.conversation_id != conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_insert_if_absent() {
        let store = MemoryChatStore::new();
        store.save_meta("c-1", "Topic A", "Stance A").unwrap();
        store.save_meta("c-1", "Topic B", "Stance B").unwrap();

        let meta = store.get_meta("c-1").unwrap().unwrap();
        assert_eq!(meta.topic, "Topic A");
    }

    #[test]
    fn test_message_order_and_window() {
        let store = MemoryChatStore::new();
        for content in ["a", "b", "c", "d"] {
            store.save_message("c-1", MessageRole::User, content).unwrap();
        }

        let asc = store.get_messages("c-1", 10, false).unwrap();
        let contents: Vec<_> = asc.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c", "d"]);

        // Most-recent-first window, bounded.
        let window = store.get_messages("c-1", 2, true).unwrap();
        let contents: Vec<_> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["d", "c"]);
    }

    #[test]
    fn test_ties_broken_by_insertion_sequence() {
        // Messages written back-to-back may share a timestamp; insertion
        // order must still be stable.
        let store = MemoryChatStore::new();
        for i in 0..20 {
            store
                .save_message("c-1", MessageRole::User, &format!("m{i}"))
                .unwrap();
        }
        let asc = store.get_messages("c-1", 20, false).unwrap();
        for (i, msg) in asc.iter().enumerate() {
            assert_eq!(msg.content, format!("m{i}"));
        }
    }

    #[test]
    fn test_list_newest_first() {
        let store = MemoryChatStore::new();
        store.save_meta("c-1", "older", "s").unwrap();
        store.save_meta("c-2", "newer", "s").unwrap();

        let chats = store.list_conversations().unwrap();
        assert_eq!(chats[0].conversation_id, "c-2");
    }

    #[test]
    fn test_delete_cascades() {
        let store = MemoryChatStore::new();
        store.save_meta("c-1", "t", "s").unwrap();
        store.save_message("c-1", MessageRole::User, "hello").unwrap();

        store.delete_conversation("c-1").unwrap();

        assert!(store.get_meta("c-1").unwrap().is_none());
        assert!(store.get_messages("c-1", 10, false).unwrap().is_empty());
    }
}
