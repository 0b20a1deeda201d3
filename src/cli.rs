//! Command-line interface definition for tern
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive chat command and a one-shot ask command.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tern - multi-capability chat in the terminal
///
/// Type free-form messages and receive responses assembled from
/// heterogeneous backend capabilities: conversation, web search,
/// fact checking, air quality, directions, time zones, and local
/// business search.
#[derive(Parser, Debug, Clone)]
#[command(name = "tern")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TERN_CONFIG", default_value = "config/config.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the owner recorded on stored conversations
    #[arg(long)]
    pub owner_id: Option<String>,

    /// Override the storage directory
    #[arg(long, env = "TERN_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for tern
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Submit one message and print the response
    Ask {
        /// The message to submit
        message: String,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
