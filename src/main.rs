//! # Conversation Memory CLI (`recall`)
//!
//! The `recall` binary stores conversations, keeps their vector index up to
//! date, and queries it.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the index database and record store directory |
//! | `recall add <file>` | Store and index one conversation |
//! | `recall import <file>` | Store and index a JSON array of conversations |
//! | `recall list` | List stored conversations |
//! | `recall show <id>` | Print one conversation |
//! | `recall search "<query>"` | Semantic search over conversation chunks |
//! | `recall context "<query>"` | Print a recalled-context block for an agent session |
//! | `recall update <id>` | Change project, topics or tags |
//! | `recall delete <id>` | Remove a conversation and its index entries |
//! | `recall index <id>` | Re-index one conversation |
//! | `recall rebuild` | Regenerate the whole index from the record store |
//! | `recall graph …` | Decisions, related, similar, topics, build |
//! | `recall stats` | Archive statistics |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use conversation_memory::ingest::{AddOptions, MetadataUpdate};
use conversation_memory::relate::SearchFilter;
use conversation_memory::store::ListFilter;
use conversation_memory::{
    config, graph_cmd, index_cmd, ingest, list, migrate, search, stats,
};

/// Conversation Memory CLI: a personal semantic memory for AI conversations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/recall.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Conversation Memory — store, index and relate past AI conversations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the index database and the record store directory.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Store one conversation and index it.
    ///
    /// The file holds either a JSON array of messages or an object with a
    /// `messages` field.
    Add {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Topic to attach (repeatable).
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Tag to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Import a JSON array of conversation documents.
    ///
    /// Existing conversations are only replaced by versions with more
    /// messages.
    Import {
        file: PathBuf,
        /// Store records without indexing them.
        #[arg(long)]
        no_index: bool,
    },

    /// List stored conversations, newest first.
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Print one stored conversation.
    Show {
        id: String,
        /// Print the raw JSON document.
        #[arg(long)]
        json: bool,
    },

    /// Semantic search over conversation chunks.
    Search {
        query: String,
        /// Maximum number of results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        topic: Option<String>,
    },

    /// Print a recalled-context block for the query.
    Context {
        query: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        project: Option<String>,
    },

    /// Change a conversation's project, topics or tags and re-index it.
    Update {
        id: String,
        #[arg(long)]
        project: Option<String>,
        /// Replace the topic list (repeatable).
        #[arg(long = "topic")]
        topics: Option<Vec<String>>,
        /// Replace the tag list (repeatable).
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },

    /// Delete a conversation and all of its index entries.
    Delete { id: String },

    /// Re-index one conversation from its stored record.
    Index { id: String },

    /// Drop the index and regenerate it from every stored conversation.
    Rebuild,

    /// Relationship queries over the archive.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Show archive statistics.
    Stats,
}

#[derive(Subcommand)]
enum GraphAction {
    /// List recorded decisions.
    Decisions {
        #[arg(long)]
        project: Option<String>,
    },

    /// Conversations sharing topics or the project.
    Related {
        id: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Conversations with semantically similar content.
    Similar {
        id: String,
        /// Minimum similarity (0-1).
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Topics grouped by project.
    Topics,

    /// Similarity graph over the whole archive.
    Build {
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the adjacency mapping as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            tokio::fs::create_dir_all(&cfg.store.path).await?;
            migrate::run_migrations(&cfg).await?;
            println!("Initialized record store at {}", cfg.store.path.display());
            println!("Initialized index at {}", cfg.db.path.display());
        }
        Commands::Add {
            file,
            title,
            project,
            topics,
            tags,
        } => {
            let options = AddOptions {
                title,
                project,
                topics,
                tags,
            };
            ingest::run_add(&cfg, &file, options).await?;
        }
        Commands::Import { file, no_index } => {
            ingest::run_import(&cfg, &file, no_index).await?;
        }
        Commands::List {
            project,
            topic,
            tag,
        } => {
            list::run_list(&cfg, ListFilter { project, topic, tag }).await?;
        }
        Commands::Show { id, json } => {
            list::run_show(&cfg, &id, json).await?;
        }
        Commands::Search {
            query,
            limit,
            project,
            topic,
        } => {
            search::run_search(&cfg, &query, limit, SearchFilter { project, topic }).await?;
        }
        Commands::Context {
            query,
            limit,
            project,
        } => {
            search::run_recall(&cfg, &query, limit, project).await?;
        }
        Commands::Update {
            id,
            project,
            topics,
            tags,
        } => {
            let update = MetadataUpdate {
                project,
                topics,
                tags,
            };
            ingest::run_update(&cfg, &id, update).await?;
        }
        Commands::Delete { id } => {
            ingest::run_delete(&cfg, &id).await?;
        }
        Commands::Index { id } => {
            index_cmd::run_index(&cfg, &id).await?;
        }
        Commands::Rebuild => {
            index_cmd::run_rebuild(&cfg).await?;
        }
        Commands::Graph { action } => match action {
            GraphAction::Decisions { project } => {
                graph_cmd::run_decisions(&cfg, project.as_deref()).await?;
            }
            GraphAction::Related { id, limit } => {
                graph_cmd::run_related(&cfg, &id, limit).await?;
            }
            GraphAction::Similar {
                id,
                threshold,
                limit,
            } => {
                graph_cmd::run_similar(&cfg, &id, threshold, limit).await?;
            }
            GraphAction::Topics => {
                graph_cmd::run_topics(&cfg).await?;
            }
            GraphAction::Build { threshold, json } => {
                graph_cmd::run_build(&cfg, threshold, json).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
