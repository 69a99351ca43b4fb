//! Generation client over an opaque text-completion backend.
//!
//! Owns the structured-extraction retry protocol (strip fences, parse,
//! one in-session retry with a stricter instruction) and the session
//! assembly for debate replies. The backend itself is a trait so the
//! hosted provider can be swapped or mocked.

pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::prompts;
use crate::store::{MessageRole, StoredMessage};

/// Errors from the generation client.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Model output failed structured parsing even after the in-session retry.
    #[error("model output failed JSON parsing after retry: {0}")]
    MalformedOutput(String),

    /// The model reported the sentinel: no debate topic was inferable.
    /// Distinct from a parse failure and recoverable by the caller.
    #[error("no debate topic could be inferred from the message")]
    NoTopicInferred,

    /// Transport or provider failure while talking to the completion service.
    #[error("completion provider failed: {0}")]
    Provider(String),

    /// Anything else.
    #[error("unexpected generation failure: {0}")]
    Unknown(String),
}

/// Role of a turn as the completion service sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Model,
}

/// One role-tagged turn of a completion session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Session-oriented text completion: prior turns plus a new prompt in,
/// raw text out. No structured output mode is assumed; the response may
/// or may not parse as JSON.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, history: &[Turn], prompt: &str) -> Result<String, GenerationError>;
}

/// The `{topic, stance}` pair derived once per conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMeta {
    pub topic: String,
    pub stance: String,
}

impl ChatMeta {
    fn is_sentinel(&self) -> bool {
        self.topic == prompts::INVALID_SENTINEL || self.stance == prompts::INVALID_SENTINEL
    }
}

/// Strip markdown code-fence artifacts from a raw model response before
/// structured parsing.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn parse_meta(raw: &str) -> Result<ChatMeta, String> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|e| e.to_string())
}

/// Generation client: metadata extraction and debate-reply generation over
/// a [`CompletionBackend`].
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn CompletionBackend>,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Derive the `{topic, stance}` pair from the user's opening message.
    ///
    /// A parse failure gets exactly one retry, in the same session: the
    /// original prompt and the model's malformed reply are preserved as
    /// prior turns so the model can self-correct. A second parse failure is
    /// [`GenerationError::MalformedOutput`]; the `INVALID` sentinel in
    /// either field is [`GenerationError::NoTopicInferred`].
    pub async fn extract_meta(&self, message: &str) -> Result<ChatMeta, GenerationError> {
        let opening = format!(
            "{}\n\nUser: {}\nResponse:",
            prompts::META_EXTRACTION_PROMPT,
            message
        );
        let first = self.backend.complete(&[], &opening).await?;

        let meta = match parse_meta(&first) {
            Ok(meta) => meta,
            Err(parse_err) => {
                debug!(error = %parse_err, "meta extraction parse failed, retrying in-session");
                let session = [Turn::user(opening), Turn::model(first)];
                let second = self
                    .backend
                    .complete(&session, prompts::STRICT_JSON_RETRY_PROMPT)
                    .await?;
                parse_meta(&second).map_err(GenerationError::MalformedOutput)?
            }
        };

        if meta.is_sentinel() {
            return Err(GenerationError::NoTopicInferred);
        }
        Ok(meta)
    }

    /// Generate the bot's next debate turn.
    ///
    /// `recent_history` arrives most-recent-first (the store's bounded
    /// window) and is reversed here to chronological order; the model must
    /// read the session oldest-first. The persona prompt is injected as the
    /// first model-authored turn.
    pub async fn generate_reply(
        &self,
        message: &str,
        recent_history: &[StoredMessage],
        topic: &str,
        stance: &str,
    ) -> Result<String, GenerationError> {
        let system_prompt = prompts::build_debate_system_prompt(topic, stance);

        let mut session = Vec::with_capacity(recent_history.len() + 1);
        session.push(Turn::model(system_prompt));
        for msg in recent_history.iter().rev() {
            let role = match msg.role {
                MessageRole::User => TurnRole::User,
                // Everything that isn't the user speaks with the model's voice.
                MessageRole::Bot => TurnRole::Model,
            };
            session.push(Turn {
                role,
                text: msg.content.clone(),
            });
        }

        let reply = self.backend.complete(&session, message).await?;
        Ok(reply.trim().to_string())
    }
}
