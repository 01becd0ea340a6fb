//! # Prompt Studio CLI (`pstudio`)
//!
//! The `pstudio` binary manages the document store, runs template analysis
//! and prompt optimization, and starts the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! pstudio --config ./config/studio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pstudio init` | Create the SQLite database and uploads directory |
//! | `pstudio ingest <file>` | Extract, chunk, embed, and register a document |
//! | `pstudio documents` | List registered documents |
//! | `pstudio get <id>` | Print one document record |
//! | `pstudio delete <id>` | Remove a document and its chunks |
//! | `pstudio clear` | Remove every document |
//! | `pstudio search "<query>"` | Similarity search over indexed chunks |
//! | `pstudio analyze <template>` | Placeholders, structure, and suggested queries |
//! | `pstudio optimize <template>` | Run the optimization loop |
//! | `pstudio stats` | Index and registry counts |
//! | `pstudio serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! pstudio init
//! pstudio ingest ./reports/annual-2023.pdf
//! pstudio analyze ./templates/company.txt --format table
//! pstudio optimize ./templates/company.txt --description "Company profile" --json
//! pstudio serve
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use prompt_studio::studio::Studio;
use prompt_studio::{commands, config, logging, server};

/// Prompt Studio: turn documents and an expected-output template into an
/// optimized RAG prompt.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/studio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pstudio",
    about = "Prompt Studio: RAG prompt optimization from documents and templates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/studio.toml`. Omitted sections take built-in
    /// defaults; `analyze` runs without a config file.
    #[arg(long, global = true, default_value = "./config/studio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an existing store changes nothing.
    Init,

    /// Ingest a PDF, DOCX, TXT, or Markdown file.
    Ingest {
        /// Path to the file.
        file: PathBuf,
    },

    /// List registered documents.
    Documents {
        #[arg(long)]
        json: bool,
    },

    /// Print a document record by id.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Delete a document, its chunks, and its stored file.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Delete every document and empty the index.
    Clear,

    /// Similarity search over indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Restrict to these document ids (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Analyze an expected-output template without calling any model.
    Analyze {
        /// File containing the template text.
        template: PathBuf,

        /// Declared output format: text, json, table, or list.
        #[arg(long)]
        format: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Run the optimization loop for a template.
    ///
    /// Requires an embedding provider and a chat model to be configured.
    Optimize {
        /// File containing the template text.
        template: PathBuf,

        /// What the output is for.
        #[arg(long)]
        description: Option<String>,

        /// Extra instructions passed to the generator.
        #[arg(long)]
        instructions: Option<String>,

        /// Declared output format: text, json, table, or list.
        #[arg(long)]
        format: Option<String>,

        /// Restrict retrieval to these document ids (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index and registry counts.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Analyze {
        template,
        format,
        json,
    } = &cli.command
    {
        let expected = commands::expected_output(template, None, None, format.as_deref())?;
        return commands::run_analyze(&expected, *json);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Serve => server::run_server(cfg).await?,
        Commands::Analyze { .. } => {}
        command => {
            let studio = Studio::open(cfg).await?;
            match command {
                Commands::Ingest { file } => commands::run_ingest(&studio, &file).await?,
                Commands::Documents { json } => commands::run_documents(&studio, json).await?,
                Commands::Get { id } => commands::run_get(&studio, &id).await?,
                Commands::Delete { id } => commands::run_delete(&studio, &id).await?,
                Commands::Clear => commands::run_clear(&studio).await?,
                Commands::Search {
                    query,
                    top_k,
                    documents,
                    json,
                } => commands::run_search(&studio, &query, top_k, &documents, json).await?,
                Commands::Optimize {
                    template,
                    description,
                    instructions,
                    format,
                    documents,
                    json,
                } => {
                    let expected = commands::expected_output(
                        &template,
                        description,
                        instructions,
                        format.as_deref(),
                    )?;
                    commands::run_optimize(&studio, &expected, &documents, json).await?
                }
                Commands::Stats { json } => commands::run_stats(&studio, json).await?,
                Commands::Init | Commands::Serve | Commands::Analyze { .. } => {}
            }
        }
    }

    Ok(())
}
