//! # Chat Query CLI (`chat-query`)
//!
//! ## Usage
//!
//! ```bash
//! chat-query --config ./config/chat-query.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chat-query serve` | Start the HTTP endpoint |
//! | `chat-query ask "<question>"` | Run one question and print the JSON reply |
//! | `chat-query import <file>` | Insert documents from a JSON array or JSON Lines file |
//! | `chat-query check` | Validate config and connect to the document store |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chat_query::cache::ConnectionCache;
use chat_query::error::HandlerError;
use chat_query::handler::RequestHandler;
use chat_query::{config, import, logging, server};

/// Chat Query: ask a document database questions in plain language.
///
/// The config file is optional; missing files fall back to defaults.
/// Credentials are read from the environment only.
#[derive(Parser)]
#[command(name = "chat-query", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chat-query.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer one question and print the JSON response.
    Ask {
        /// The question, in plain language.
        question: String,
    },

    /// Insert documents from a JSON array or JSON Lines file.
    Import {
        file: PathBuf,

        /// Target collection. Defaults to `[store].collection`.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Validate the configuration and connect to the document store.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { question } => {
            let question = question.trim();
            if question.is_empty() {
                return Err(HandlerError::MissingMessage.into());
            }
            let handler = RequestHandler::from_config(&cfg)?;
            let response = handler.run(question).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Import { file, collection } => {
            let n = import::run_import(&cfg, &file, collection.as_deref()).await?;
            println!("imported {} documents", n);
        }
        Commands::Check => {
            let cache = ConnectionCache::new(cfg.store.clone());
            let store = cache.get_store().await?;
            println!(
                "ok: {} store, collection {}.{}",
                store.backend_name(),
                cfg.store.database,
                cfg.store.collection
            );
            match cfg.llm.api_key() {
                Some(_) => println!("ok: {} set", cfg.llm.api_key_env),
                None => println!("warning: {} not set", cfg.llm.api_key_env),
            }
        }
    }

    Ok(())
}
