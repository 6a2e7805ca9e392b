// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Colloquy - conversational assistant backend.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colloquy_config::ColloquyConfig;
use colloquy_core::{ColloquyError, ConversationKey};
use colloquy_session::{RetentionPolicy, TranscriptRepository};

/// Colloquy - conversational assistant backend.
#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server (default).
    Serve,
    /// Print a stored transcript as JSON lines.
    Show {
        /// Conversation id, with or without the storage prefix.
        conversation: String,
    },
    /// Validate configuration and print the resolved values.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => colloquy_config::load_and_validate_path(path),
        None => colloquy_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            colloquy_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Show { conversation } => show(&config, &conversation).await,
        Commands::CheckConfig => check_config(&config),
    };

    if let Err(e) = result {
        eprintln!("colloquy: {e}");
        std::process::exit(1);
    }
}

/// Dump one transcript, oldest message first.
async fn show(config: &ColloquyConfig, conversation: &str) -> Result<(), ColloquyError> {
    let store = colloquy_storage::connect(&config.storage).await?;
    let repo = TranscriptRepository::from_config(
        store.clone(),
        &config.session,
        RetentionPolicy::from(&config.retention),
    );
    let key = ConversationKey::normalize(Some(conversation), repo.key_prefix());
    for message in repo.load(&key).await? {
        println!("{}", serde_json::to_string(&message)?);
    }
    store.close().await
}

fn check_config(config: &ColloquyConfig) -> Result<(), ColloquyError> {
    let mut shown = config.clone();
    if shown.openai.api_key.is_some() {
        shown.openai.api_key = Some("[redacted]".to_string());
    }
    let rendered = toml::to_string_pretty(&shown)
        .map_err(|e| ColloquyError::Config(format!("failed to render configuration: {e}")))?;
    println!("{rendered}");
    eprintln!("colloquy: configuration is valid");
    Ok(())
}
