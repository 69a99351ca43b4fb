//! Environment-derived runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default bounded history window handed to the generation client.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Top-level configuration, read once at process start and injected.
#[derive(Debug, Clone)]
pub struct KopiConfig {
    /// API key for the hosted generation service (`GOOGLE_API_KEY`).
    pub api_key: Option<String>,
    /// Model identifier (`KOPI_MODEL`).
    pub model: String,
    /// Most-recent-message window size per turn (`KOPI_HISTORY_WINDOW`).
    pub history_window: usize,
    /// Bounded timeout for each generation call (`KOPI_TIMEOUT_SECS`).
    pub request_timeout: Duration,
    /// Sqlite database path (`KOPI_DB_PATH`).
    pub db_path: PathBuf,
}

impl Default for KopiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GOOGLE_API_KEY").ok(),
            model: std::env::var("KOPI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into()),
            history_window: std::env::var("KOPI_HISTORY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HISTORY_WINDOW),
            request_timeout: Duration::from_secs(
                std::env::var("KOPI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
            db_path: std::env::var("KOPI_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("kopi-chat.db")),
        }
    }
}
