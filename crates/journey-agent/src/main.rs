//! # journey-agent CLI (`jag`)
//!
//! The `jag` binary drives the full harness: database initialization,
//! documentation ingestion, retrieval, the tool-calling agent, one-shot
//! and batch extraction, and the HTTP tool server.
//!
//! ## Usage
//!
//! ```bash
//! jag --config ./config/journey.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jag init` | Create the SQLite database schema |
//! | `jag ingest [--reset]` | Ingest the data folder (txt/md/pdf) |
//! | `jag search "<query>"` | Vector retrieval without the agent |
//! | `jag ask "<question>"` | Run the tool-calling agent |
//! | `jag extract [text]` | One-shot journey extraction |
//! | `jag batch <in> <out>` | Batch extraction to JSONL |
//! | `jag serve` | Start the HTTP tool/journeys server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use journey_agent::{agent, batch, config, ingest, llm, migrate, retrieve, server};
use journey_agent_core::extract::extract_journey_info;
use journey_agent_core::record::Confidence;

/// journey-agent — a retrieval-augmented agent harness for rail journey
/// revenue analysis.
#[derive(Parser)]
#[command(
    name = "jag",
    about = "journey-agent — a retrieval-augmented agent harness for rail journey revenue analysis",
    version,
    long_about = "journey-agent ingests revenue-management documentation into a local vector \
    store and drives retrieval, a remote strategy search, and a deterministic journey-record \
    extractor through a tool-calling chat model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/journey.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and all required tables (documents, chunks,
    /// embeddings). Idempotent — running it multiple times is safe.
    Init,

    /// Ingest documents from the data folder.
    ///
    /// Scans `[data].path` for .txt, .md, and .pdf files, chunks them, and
    /// stores them (with embeddings, when a provider is configured).
    /// Unchanged files are skipped.
    Ingest {
        /// Clear the database before ingesting.
        #[arg(long)]
        reset: bool,
    },

    /// Search the ingested documentation directly.
    ///
    /// Embeds the query and prints the top-k most similar passages.
    /// Requires an embedding provider.
    Search {
        /// The search query string.
        query: String,
    },

    /// Ask the agent a question.
    ///
    /// Runs the tool-calling loop against the configured chat model. The
    /// model decides which tools to call; each step is printed as it runs.
    Ask {
        /// The question.
        question: String,
    },

    /// Extract a journey record from text.
    ///
    /// Uses a built-in sample when no text is given. Prints the JSON
    /// record.
    Extract {
        /// The text to analyze.
        text: Option<String>,

        /// Refine low-confidence extractions with the configured chat
        /// model.
        #[arg(long)]
        refine: bool,
    },

    /// Extract journey records for every line of a JSONL file.
    Batch {
        /// Input JSONL file (one object per line).
        input: PathBuf,

        /// Output JSONL file.
        output: PathBuf,

        /// Analyze this field instead of concatenating all values.
        #[arg(long)]
        text_field: Option<String>,
    },

    /// Start the HTTP tool/journeys server.
    Serve,
}

/// Built-in sample used by `jag extract` when no text is given.
const SAMPLE_TEXT: &str = "JourneyId: 98765\nScore: -4.2\n\
Reason: Excessive delay at origin due to operational issue.\n\
Solution: Replan connection and alert customer service.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Commands that work without a config file.
    match &cli.command {
        Commands::Extract { text, refine } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            let input = text.clone().unwrap_or_else(|| SAMPLE_TEXT.to_string());
            run_extract(&cfg, &input, *refine).await?;
            return Ok(());
        }
        Commands::Batch {
            input,
            output,
            text_field,
        } => {
            batch::run_batch(input, output, text_field.as_deref())?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { reset } => {
            ingest::run_ingest(&cfg, reset).await?;
        }
        Commands::Search { query } => {
            retrieve::run_search(&cfg, &query).await?;
        }
        Commands::Ask { question } => {
            agent::run_ask(&cfg, &question).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Extract { .. } | Commands::Batch { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

async fn run_extract(cfg: &config::Config, text: &str, refine: bool) -> anyhow::Result<()> {
    let mut record = extract_journey_info(text, None);

    if refine && record.confidence == Confidence::Low {
        let provider = llm::OpenAiChat::from_config(&cfg.chat)?;
        if let Some(refined) = llm::refine_record(&provider, text).await {
            record = refined;
        }
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
