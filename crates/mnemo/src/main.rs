// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mnemo - hybrid multi-recall memory for conversational characters.
//!
//! This is the binary entry point: it loads configuration, installs logging
//! and drives the memory service from the command line.

mod commands;
mod health;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mnemo_core::MnemoError;
use mnemo_memory::{Namespace, NamespaceKind};

/// Mnemo - hybrid multi-recall memory for conversational characters.
#[derive(Parser, Debug)]
#[command(name = "mnemo", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which namespace a command works on.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Character id.
    #[arg(long, short = 'c')]
    character: Option<String>,
    /// Story id.
    #[arg(long, short = 's')]
    story: Option<String>,
}

impl Target {
    pub fn namespace(&self) -> Result<Namespace, MnemoError> {
        match (&self.character, &self.story) {
            (Some(id), _) => Namespace::new(NamespaceKind::Character, id),
            (None, Some(id)) => Namespace::new(NamespaceKind::Story, id),
            (None, None) => Err(MnemoError::Config(
                "pass --character or --story".to_string(),
            )),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Record one user/assistant exchange.
    Add {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        user: String,
        #[arg(long)]
        assistant: String,
    },
    /// Print the memory block for a query.
    Search {
        query: String,
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Search a character's memory and details together.
    DualSearch {
        query: String,
        /// Character id.
        #[arg(long, short = 'c')]
        character: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Import reference text files as character details.
    ImportDetails {
        character: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show store statistics.
    Stats {
        #[command(flatten)]
        target: Target,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the most recent conversation turns.
    Recent {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Copy stored conversations from one backend to another.
    Migrate {
        #[command(flatten)]
        target: Target,
        /// Source backend: delegating, indexed-file or relational.
        #[arg(long)]
        from: String,
        /// Target backend: delegating, indexed-file or relational.
        #[arg(long)]
        to: String,
    },
    /// Check the configured embedding and rerank backends.
    Health {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => mnemo_config::load_and_validate_path(path),
        None => mnemo_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            mnemo_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let result = match cli.command {
        Commands::Add {
            target,
            user,
            assistant,
        } => commands::add(config, &target, &user, &assistant).await,
        Commands::Search {
            query,
            target,
            top_k,
        } => commands::search(config, &target, &query, top_k).await,
        Commands::DualSearch {
            query,
            character,
            top_k,
        } => commands::dual_search(config, &character, &query, top_k).await,
        Commands::ImportDetails { character, files } => {
            commands::import_details(config, &character, &files).await
        }
        Commands::Stats { target, json } => commands::stats(config, &target, json).await,
        Commands::Recent {
            target,
            limit,
            json,
        } => commands::recent(config, &target, limit, json).await,
        Commands::Migrate { target, from, to } => {
            commands::migrate(config, &target, &from, &to).await
        }
        Commands::Health { plain } => health::run_health(&config, plain).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over `log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mnemo={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
