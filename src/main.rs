//! # groundchat CLI
//!
//! ## Usage
//!
//! ```bash
//! groundchat [--config ./config/groundchat.toml] [-v...] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `groundchat ingest` | Load, split and embed the document into the vector index |
//! | `groundchat search "<query>"` | Print the chunks retrieval returns for a query |
//! | `groundchat chat` | Interactive terminal chat |
//! | `groundchat serve` | Web chat UI and API |

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundchat::{config, ingest, repl, runtime, search, server};

/// groundchat: retrieval-augmented chat over a help guide.
///
/// Secrets come from the environment: NVIDIA_API_KEY, PINECONE_API_KEY,
/// PINECONE_INDEX_NAME, and OPENAI_API_KEY for the openai embedding provider.
#[derive(Parser)]
#[command(
    name = "groundchat",
    about = "groundchat: retrieval-augmented chat over a help guide",
    version,
    long_about = "groundchat ingests a document into a vector index and answers questions about it \
    with a hosted language model, grounding each answer in the most similar document chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/groundchat.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG`
    /// takes precedence when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured document.
    ///
    /// Loads `document.path`, splits it into overlapping chunks, embeds
    /// them and upserts the vectors, creating the index if needed.
    Ingest {
        /// Only load and split the document; print counts without embedding
        /// or contacting the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what retrieval returns for a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of chunks to retrieve (default: `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Chat in the terminal.
    Chat {
        /// Ingest the document before chatting (for the `memory` index).
        #[arg(long)]
        ingest: bool,
    },

    /// Start the web chat server.
    ///
    /// Binds to `[server].bind` and serves the chat page and API.
    Serve {
        /// Ingest the document before serving (for the `memory` index).
        #[arg(long)]
        ingest: bool,
    },
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref())?;
    info!(document = %cfg.document.path.display(), index = %cfg.index.name, "configuration loaded");

    match cli.command {
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Chat { ingest } => {
            let orchestrator = runtime::build_orchestrator(&cfg, ingest).await?;
            repl::ChatRepl::new(orchestrator).run().await?;
        }
        Commands::Serve { ingest } => {
            let orchestrator = runtime::build_orchestrator(&cfg, ingest).await?;
            server::run_server(&cfg, orchestrator).await?;
        }
    }

    Ok(())
}
