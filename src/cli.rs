//! Command-line interface definition for Horizon
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the HTTP service and check the provider.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Horizon - physics assistant backend
///
/// Serves per-user chat conversations backed by an OpenAI-compatible
/// completion API, with an offline fallback when the API is unavailable.
#[derive(Parser, Debug, Clone)]
#[command(name = "horizon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Conversation database file (overrides config and HORIZON_DB_PATH)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Horizon
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Socket address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Send a test question to the completion API and print the result as JSON
    Ping,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            db: None,
            command: Commands::Serve { bind: None },
        }
    }
}
