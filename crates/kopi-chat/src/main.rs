//! Kopi chat CLI: wires the store, backend, and orchestrator together once
//! at startup and exposes the four logical operations.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use kopi_chat::{
    ChatService, ChatStore, GeminiBackend, KopiConfig, LlmClient, MemoryChatStore, SqliteChatStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Persisted debate chat with a stance-locked opponent")]
struct Cli {
    /// Use a volatile in-memory store instead of the sqlite database.
    #[arg(long, default_value_t = false)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message; starts a new conversation when --conversation is omitted.
    Send {
        /// Existing conversation id to continue.
        #[arg(long)]
        conversation: Option<String>,
        /// The message text.
        message: String,
    },
    /// List all conversations, newest first.
    Chats,
    /// Show a conversation's message log.
    History {
        conversation_id: String,
        /// Maximum number of messages (must be at least 1).
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Oldest first instead of newest first.
        #[arg(long, default_value_t = false)]
        asc: bool,
    },
    /// Delete a conversation and all of its messages.
    Delete { conversation_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = KopiConfig::default();

    let store: Arc<dyn ChatStore> = if cli.in_memory {
        Arc::new(MemoryChatStore::new())
    } else {
        info!(db_path = %config.db_path.display(), "opening sqlite store");
        Arc::new(SqliteChatStore::open(&config.db_path)?)
    };

    let api_key = config.api_key.clone().unwrap_or_default();
    let backend = GeminiBackend::new(api_key.clone(), config.model.clone(), config.request_timeout)?;
    let service = ChatService::new(store, LlmClient::new(Arc::new(backend)), config.history_window);

    match cli.command {
        Command::Send {
            conversation,
            message,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("GOOGLE_API_KEY is not set");
            }
            let outcome = service.post_message(conversation.as_deref(), &message).await?;
            println!("conversation: {}", outcome.conversation_id);
            println!("{}", outcome.reply);
        }
        Command::Chats => {
            for chat in service.list_chats()? {
                println!(
                    "{}  {}  {}",
                    chat.created_at.to_rfc3339(),
                    chat.conversation_id,
                    chat.topic
                );
            }
        }
        Command::History {
            conversation_id,
            limit,
            asc,
        } => {
            for msg in service.history(&conversation_id, limit, asc)? {
                println!("[{}] {}: {}", msg.created_at.to_rfc3339(), msg.role, msg.content);
            }
        }
        Command::Delete { conversation_id } => {
            service.delete_chat(&conversation_id)?;
            println!("deleted {conversation_id}");
        }
    }

    Ok(())
}
