//! Kopi chat: a persisted debate-chat backend with a stance-locked opponent.
//!
//! The bot derives a `{topic, stance}` pair from the user's first message,
//! commits it immutably for the conversation's life, and argues that stance
//! across turns against adversarial attempts to derail it.
//!
//! Components:
//! - [`prompts`]: extraction and debate-persona prompt builders (pure).
//! - [`llm`]: generation client over an opaque completion backend, with the
//!   structured-extraction retry protocol and session assembly.
//! - [`store`]: conversation metadata plus append-only message logs, behind
//!   a trait with sqlite and in-memory backends.
//! - [`chat`]: the stateless orchestrator sequencing store and generation
//!   calls per turn.

pub mod chat;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod store;

pub use chat::{ChatError, ChatService, TurnOutcome};
pub use config::KopiConfig;
pub use llm::gemini::GeminiBackend;
pub use llm::{ChatMeta, CompletionBackend, GenerationError, LlmClient, Turn, TurnRole};
pub use store::memory::MemoryChatStore;
pub use store::sqlite::SqliteChatStore;
pub use store::{
    ChatStore, ConversationMeta, ConversationSummary, MessageRole, StoreError, StoredMessage,
};
