//! Chat orchestrator: drives the per-turn store/generate sequence and the
//! stance-commitment protocol.
//!
//! The service is stateless between calls: every turn re-reads what it
//! needs, so one instance behind an `Arc` is safe for concurrent use and
//! horizontally replicable. Per-conversation state lives entirely in the
//! store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::DEFAULT_HISTORY_WINDOW;
use crate::llm::{GenerationError, LlmClient};
use crate::store::{ChatStore, ConversationSummary, MessageRole, StoreError, StoredMessage};

/// Error from the chat orchestrator. Every store/generation failure is
/// converted to one of these at the boundary; nothing untyped crosses it.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The generation service could not produce a usable topic/stance.
    /// The conversation is left uncreated: no metadata, no messages.
    #[error("failed to extract conversation metadata: {0}")]
    MetaExtraction(#[source] GenerationError),

    /// The generation service failed on the turn reply. The user message
    /// stays persisted without a paired bot reply.
    #[error("failed to generate debate reply: {0}")]
    ReplyGeneration(#[source] GenerationError),

    /// A persistence operation faulted. Not retried; surfaced.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// History reads require a window of at least one message.
    #[error("history limit must be at least 1, got {0}")]
    InvalidHistoryLimit(usize),
}

/// Outcome of one successful turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

/// The conversation orchestrator.
///
/// Wiring is plain dependency injection: the store and generation client
/// are constructed once at process start and handed in.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    llm: LlmClient,
    history_window: usize,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, llm: LlmClient, history_window: usize) -> Self {
        Self {
            store,
            llm,
            history_window,
        }
    }

    /// Convenience constructor with the default history window.
    pub fn with_defaults(store: Arc<dyn ChatStore>, llm: LlmClient) -> Self {
        Self::new(store, llm, DEFAULT_HISTORY_WINDOW)
    }

    /// Process one user turn.
    ///
    /// A missing `conversation_id` starts a fresh conversation. The
    /// topic/stance pair is derived and committed exactly once, on the
    /// first message; an extraction failure is an atomic no-op (no
    /// metadata, no messages). After metadata exists the user message is
    /// persisted unconditionally and is NOT rolled back if reply
    /// generation fails, so a turn may record a user message with no
    /// paired bot reply.
    pub async fn post_message(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let conversation_id = conversation_id
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let meta = match self.store.get_meta(&conversation_id)? {
            Some(meta) => meta,
            None => {
                let extracted = self.llm.extract_meta(message).await.map_err(|e| {
                    error!(conversation_id = %conversation_id, error = %e, "meta extraction failed");
                    ChatError::MetaExtraction(e)
                })?;
                self.store
                    .save_meta(&conversation_id, &extracted.topic, &extracted.stance)?;
                info!(
                    conversation_id = %conversation_id,
                    topic = %extracted.topic,
                    "conversation metadata committed"
                );
                // Re-read instead of trusting our extraction: under a racing
                // first message the first committed pair wins.
                self.store.get_meta(&conversation_id)?.ok_or_else(|| {
                    ChatError::Store(StoreError::Backend(
                        "conversation metadata missing after commit".to_string(),
                    ))
                })?
            }
        };

        self.store
            .save_message(&conversation_id, MessageRole::User, message)?;

        let window = self
            .store
            .get_messages(&conversation_id, self.history_window, true)?;

        let reply = self
            .llm
            .generate_reply(message, &window, &meta.topic, &meta.stance)
            .await
            .map_err(|e| {
                error!(conversation_id = %conversation_id, error = %e, "reply generation failed");
                ChatError::ReplyGeneration(e)
            })?;

        let bot_message = self
            .store
            .save_message(&conversation_id, MessageRole::Bot, &reply)?;

        info!(conversation_id = %conversation_id, "turn completed");
        Ok(TurnOutcome {
            conversation_id,
            reply,
            created_at: bot_message.created_at,
        })
    }

    /// List all conversations, newest first.
    pub fn list_chats(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        Ok(self.store.list_conversations()?)
    }

    /// Read-only projection of a conversation's log. `limit` must be ≥ 1;
    /// the caller controls sort direction.
    pub fn history(
        &self,
        conversation_id: &str,
        limit: usize,
        ascending: bool,
    ) -> Result<Vec<StoredMessage>, ChatError> {
        if limit < 1 {
            return Err(ChatError::InvalidHistoryLimit(limit));
        }
        Ok(self
            .store
            .get_messages(conversation_id, limit, !ascending)?)
    }

    /// Delete a conversation; the store cascades to its messages.
    pub fn delete_chat(&self, conversation_id: &str) -> Result<(), ChatError> {
        self.store.delete_conversation(conversation_id)?;
        info!(conversation_id = %conversation_id, "conversation deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationError, MockCompletionBackend, Turn, TurnRole};
    use crate::store::memory::MemoryChatStore;
    use crate::store::MockChatStore;
    use std::sync::Mutex;

    fn service_with(backend: MockCompletionBackend, store: Arc<dyn ChatStore>) -> ChatService {
        ChatService::with_defaults(store, LlmClient::new(Arc::new(backend)))
    }

    fn meta_json() -> String {
        "{\"topic\": \"Pineapple on pizza\", \"stance\": \"Pineapple belongs on pizza\"}".into()
    }

    #[tokio::test]
    async fn test_new_conversation_happy_path() {
        let store = Arc::new(MemoryChatStore::new());
        let mut backend = MockCompletionBackend::new();
        // First call extracts metadata, second generates the reply.
        backend
            .expect_complete()
            .times(1)
            .withf(|history, _| history.is_empty())
            .returning(|_, _| Ok(meta_json()));
        backend
            .expect_complete()
            .times(1)
            .withf(|history, _| !history.is_empty())
            .returning(|_, _| Ok("Pineapple's sweetness balances the salt.".into()));

        let service = service_with(backend, store.clone());
        let outcome = service
            .post_message(None, "Let's debate whether pineapple belongs on pizza, you argue yes")
            .await
            .unwrap();

        assert!(!outcome.reply.is_empty());
        assert!(!outcome.conversation_id.is_empty());

        let meta = store.get_meta(&outcome.conversation_id).unwrap().unwrap();
        assert_eq!(meta.topic, "Pineapple on pizza");
        assert_eq!(meta.stance, "Pineapple belongs on pizza");

        let messages = store
            .get_messages(&outcome.conversation_id, 10, false)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Bot);
        assert_eq!(messages[1].content, outcome.reply);
    }

    #[tokio::test]
    async fn test_meta_extraction_failure_is_atomic() {
        let store = Arc::new(MemoryChatStore::new());
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(GenerationError::Provider("unreachable".into())));

        let service = service_with(backend, store.clone());
        let err = service.post_message(Some("c-new"), "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::MetaExtraction(_)));

        // Atomic no-op: no metadata row, no messages.
        assert!(store.get_meta("c-new").unwrap().is_none());
        assert!(store.get_messages("c-new", 10, false).unwrap().is_empty());
        assert!(store.list_conversations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_meta_never_reextracted() {
        // A mock store proves extraction is skipped: get_meta returns a
        // committed pair, save_meta must never be called, and the only
        // backend call is the reply.
        let mut store = MockChatStore::new();
        store.expect_get_meta().times(1).returning(|id| {
            Ok(Some(crate::store::ConversationMeta {
                conversation_id: id.to_string(),
                topic: "Earth's Shape".to_string(),
                stance: "The earth is flat".to_string(),
                created_at: Utc::now(),
            }))
        });
        store.expect_save_meta().times(0);
        store
            .expect_save_message()
            .times(2)
            .returning(|id, role, content| {
                Ok(StoredMessage {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: id.to_string(),
                    role,
                    content: content.to_string(),
                    created_at: Utc::now(),
                })
            });
        store
            .expect_get_messages()
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .withf(|history, _| {
                // Only the reply call happens, with the committed stance in
                // the persona turn.
                history
                    .first()
                    .is_some_and(|t| t.text.contains("The earth is flat"))
            })
            .returning(|_, _| Ok("Horizons look flat to me.".into()));

        let service = service_with(backend, Arc::new(store));
        let outcome = service.post_message(Some("c-1"), "but photos!").await.unwrap();
        assert_eq!(outcome.conversation_id, "c-1");
    }

    #[tokio::test]
    async fn test_reply_failure_keeps_user_message() {
        let store = Arc::new(MemoryChatStore::new());
        store.save_meta("c-1", "Moon landing", "was faked").unwrap();

        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(GenerationError::Provider("503".into())));

        let service = service_with(backend, store.clone());
        let err = service
            .post_message(Some("c-1"), "why did the flag wave?")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ReplyGeneration(_)));

        // The user message stays; no bot message was persisted.
        let messages = service.history("c-1", 10, true).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "why did the flag wave?");
    }

    #[tokio::test]
    async fn test_reply_sees_bounded_chronological_window() {
        // Seed three prior turns, use a window of 2: the backend must see
        // the persona turn, then the two most recent prior messages in
        // chronological order, with the just-saved user message last.
        let store = Arc::new(MemoryChatStore::new());
        store.save_meta("c-1", "t", "s").unwrap();
        store.save_message("c-1", MessageRole::User, "one").unwrap();
        store.save_message("c-1", MessageRole::Bot, "two").unwrap();
        store.save_message("c-1", MessageRole::User, "three").unwrap();

        let seen: Arc<Mutex<Vec<Turn>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().times(1).returning(move |history, _| {
            *seen_clone.lock().unwrap() = history.to_vec();
            Ok("reply".into())
        });

        let service = ChatService::new(store, LlmClient::new(Arc::new(backend)), 2);
        service.post_message(Some("c-1"), "four").await.unwrap();

        let session = seen.lock().unwrap();
        assert_eq!(session[0].role, TurnRole::Model); // persona prompt
        let texts: Vec<_> = session[1..].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["three", "four"]);
    }

    #[tokio::test]
    async fn test_delete_chat_empties_listing_and_history() {
        let store = Arc::new(MemoryChatStore::new());
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .withf(|history, _| history.is_empty())
            .returning(|_, _| Ok(meta_json()));
        backend
            .expect_complete()
            .times(1)
            .withf(|history, _| !history.is_empty())
            .returning(|_, _| Ok("reply".into()));

        let service = service_with(backend, store);
        let outcome = service.post_message(None, "pineapple?").await.unwrap();
        assert_eq!(service.list_chats().unwrap().len(), 1);

        service.delete_chat(&outcome.conversation_id).unwrap();

        assert!(service.list_chats().unwrap().is_empty());
        assert!(service
            .history(&outcome.conversation_id, 10, true)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_rejects_zero_limit() {
        let store = Arc::new(MemoryChatStore::new());
        let service = service_with(MockCompletionBackend::new(), store);
        let err = service.history("c-1", 0, true).unwrap_err();
        assert!(matches!(err, ChatError::InvalidHistoryLimit(0)));
    }

    #[tokio::test]
    async fn test_history_direction_control() {
        let store = Arc::new(MemoryChatStore::new());
        store.save_meta("c-1", "t", "s").unwrap();
        store.save_message("c-1", MessageRole::User, "first").unwrap();
        store.save_message("c-1", MessageRole::Bot, "second").unwrap();

        let service = service_with(MockCompletionBackend::new(), store);

        let asc = service.history("c-1", 10, true).unwrap();
        assert_eq!(asc[0].content, "first");

        let desc = service.history("c-1", 10, false).unwrap();
        assert_eq!(desc[0].content, "second");
    }

    #[tokio::test]
    async fn test_no_topic_inferred_surfaces_as_meta_extraction() {
        let store = Arc::new(MemoryChatStore::new());
        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().times(1).returning(|_, _| {
            Ok("{\"topic\": \"INVALID\", \"stance\": \"INVALID\"}".into())
        });

        let service = service_with(backend, store.clone());
        let err = service.post_message(Some("c-1"), "hello!").await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::MetaExtraction(GenerationError::NoTopicInferred)
        ));
        assert!(store.get_meta("c-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_typed() {
        let mut store = MockChatStore::new();
        store
            .expect_get_meta()
            .times(1)
            .returning(|_| Err(StoreError::Backend("disk on fire".into())));

        let service = service_with(MockCompletionBackend::new(), Arc::new(store));
        let err = service.post_message(Some("c-1"), "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Store(_)));
    }
}
