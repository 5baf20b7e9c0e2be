//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Failure cache commands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show cached events
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete the failure cache
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the cache file path
    Path,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Drain command arguments.
///
/// Redelivers the failure cache through the regular delivery client. The
/// cache is not scoped by session, so the target session must be named
/// explicitly by the operator.
#[derive(Debug, Args)]
pub struct DrainCommand {
    /// Session to deliver the cached events to
    #[arg(short, long)]
    pub session: String,
}
