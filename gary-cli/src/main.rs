//! Gary AI CLI - talk to a Gary AI backend from the terminal

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gary_core::prelude::*;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "gary")]
#[command(about = "Gary AI chat API client", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to gary.toml, GARY_CONFIG_PATH and GARY_* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// REST base URL, e.g. https://example.com/wp-json/gary-ai/v1
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// WordPress REST nonce
    #[arg(long, global = true)]
    nonce: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the backend
    Health,
    /// Show widget settings
    Settings,
    /// Send a chat message
    Chat {
        /// Message text
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Show the message history of a conversation
    History {
        /// Conversation ID
        id: String,
    },
    /// Re-authenticate the stored session
    Reconnect,
    /// Resume a conversation (the last one used when no ID is given)
    Resume {
        /// Conversation ID
        id: Option<String>,
    },
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => print_version(),
        _ => run(&cli).await?,
    }

    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let client = build_client(cli)?;

    match &cli.command {
        Commands::Health => {
            let health = client.check_health().await;
            print_json(&health)?;
            if !health.healthy {
                std::process::exit(1);
            }
        }
        Commands::Settings => print_json(&client.get_settings().await)?,
        Commands::Chat {
            message,
            conversation,
        } => {
            let reply = client
                .send_message(message, conversation.as_deref())
                .await
                .context("Failed to send message")?;
            print_json(&reply)?;
        }
        Commands::History { id } => {
            let conversation = client
                .get_conversation(id)
                .await
                .with_context(|| format!("Failed to load conversation {}", id))?;
            print_json(&conversation)?;
        }
        Commands::Reconnect => {
            let result = client.reconnect_session().await;
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Resume { id } => {
            let result = match id {
                Some(id) => client.resume_conversation(id).await,
                None => client
                    .resume_stored_conversation()
                    .await
                    .context("No stored conversation to resume")?,
            };
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Version => print_version(),
    }

    Ok(())
}

fn print_version() {
    println!("gary {}", env!("CARGO_PKG_VERSION"));
    println!("gary-core {}", gary_core::VERSION);
}

fn build_client(cli: &Cli) -> Result<GaryClient> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ClientConfig::load().context("Failed to load configuration")?,
    };

    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(nonce) = &cli.nonce {
        config = config.with_nonce(nonce.clone());
    }

    let storage_path = config
        .storage_path
        .clone()
        .or_else(default_storage_path)
        .context("No data directory available; set storage_path")?;

    let durable = open_store(&storage_path);
    let session = open_store(&session_path(&storage_path));

    GaryClient::builder()
        .config(config)
        .durable_store(durable)
        .session_store(session)
        .build()
        .context("Failed to create client")
}

/// File store at `path`, or memory if the file cannot be used
fn open_store(path: &Path) -> Arc<dyn KeyValueStore> {
    match FileStore::open(path) {
        Ok(store) => {
            tracing::debug!(storage = %path.display(), "Using file storage");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                storage = %path.display(),
                error = %e,
                "Cannot open storage file, continuing in memory"
            );
            Arc::new(InMemoryStore::new())
        }
    }
}

fn default_storage_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("gary-ai").join("storage.json"))
}

/// Conversation state lives next to the durable store
fn session_path(storage_path: &Path) -> PathBuf {
    storage_path.with_file_name("conversation.json")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
