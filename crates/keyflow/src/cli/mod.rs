//! Command-line interface for keyflow.
//!
//! This module provides the CLI structure and command handlers for the
//! `keyflow` binary: operator tooling for inspecting configuration and the
//! failure cache, and for draining the cache back to the ingest endpoint.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{CacheCommand, ConfigCommand, DrainCommand, StatusCommand};

/// keyflow - keystroke telemetry pipeline tooling
///
/// Inspect the pipeline's configuration and failure cache, and redeliver
/// cached batches that failed transiently during a typing session.
#[derive(Debug, Parser)]
#[command(name = "keyflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show pipeline configuration and failure cache status
    Status(StatusCommand),

    /// Inspect or clear the failure cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Redeliver cached events to the ingest endpoint
    Drain(DrainCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
