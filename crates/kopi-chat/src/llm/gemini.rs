//! Gemini HTTP backend for the completion trait.
//!
//! Talks to the hosted `generateContent` endpoint with role-tagged turns.
//! Every transport, status, or shape problem surfaces as
//! [`GenerationError::Provider`]; the session/retry protocol above this
//! layer stays provider-agnostic.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{CompletionBackend, GenerationError, Turn, TurnRole};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// [`CompletionBackend`] over the Gemini `generateContent` API.
pub struct GeminiBackend {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Build a backend with a bounded per-request timeout.
    pub fn new(
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    fn role_tag(role: TurnRole) -> &'static str {
        match role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(&self, history: &[Turn], prompt: &str) -> Result<String, GenerationError> {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": Self::role_tag(turn.role),
                    "parts": [{ "text": turn.text }]
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": prompt }]
        }));

        let request_body = json!({ "contents": contents });
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        debug!(model = %self.model, turns = history.len(), "requesting completion");

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!(
                "Gemini API error ({status}): {body}"
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        resp_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::Provider("response missing candidate text".to_string())
            })
    }
}
