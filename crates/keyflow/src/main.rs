//! `keyflow` - CLI for the keystroke telemetry pipeline
//!
//! Operator tooling: inspect configuration and the failure cache, and
//! redeliver cached batches to the ingest endpoint.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use keyflow::cli::{CacheCommand, Cli, Command, ConfigCommand, DrainCommand, StatusCommand};
use keyflow::delivery::{drain_cache, INGEST_BATCH_LIMIT};
use keyflow::{init_logging, Config, DeliveryOutcome, FailureCache, HttpIngest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Status(status_cmd) => handle_status(&config, &status_cmd),
        Command::Cache(cache_cmd) => handle_cache(&config, &cache_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Drain(drain_cmd) => handle_drain(&config, &drain_cmd).await,
    }
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let cache = FailureCache::new(config.cache_path());
    let cached = cache.len().context("failed to read failure cache")?;

    if cmd.json {
        let status = serde_json::json!({
            "ingest_base_url": config.ingest.base_url,
            "max_batch_size": config.flush.max_batch_size,
            "idle_timeout_ms": config.flush.idle_timeout_ms,
            "cache_path": config.cache_path(),
            "cached_events": cached,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("keyflow status");
        println!("--------------");
        println!("Ingest URL:     {}", config.ingest.base_url);
        println!("Batch size:     {}", config.flush.max_batch_size);
        println!("Idle timeout:   {} ms", config.flush.idle_timeout_ms);
        println!("Cache path:     {}", config.cache_path().display());
        println!("Cached events:  {cached}");
    }
    Ok(())
}

fn handle_cache(config: &Config, cmd: &CacheCommand) -> anyhow::Result<()> {
    let cache = FailureCache::new(config.cache_path());
    match cmd {
        CacheCommand::Show { json } => {
            let events = cache.load().context("failed to read failure cache")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("Failure cache is empty.");
            } else {
                println!("{} cached event(s):", events.len());
                for event in &events {
                    println!(
                        "  {:>8} ms  {:<5} {:<16} {}{}",
                        event.timestamp_offset,
                        event.event_type,
                        event.key_code,
                        event.finger_used,
                        if event.is_error { "  [error]" } else { "" }
                    );
                }
            }
        }
        CacheCommand::Clear { yes } => {
            if !yes {
                println!("This will delete all cached telemetry events.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            cache.clear().context("failed to clear failure cache")?;
            println!("Failure cache cleared.");
        }
        CacheCommand::Path => {
            println!("{}", cache.path().display());
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Ingest]");
                println!("  Base URL:         {}", config.ingest.base_url);
                println!(
                    "  Auth token:       {}",
                    if config.ingest.auth_token.is_some() {
                        "set"
                    } else {
                        "not set"
                    }
                );
                println!(
                    "  Request timeout:  {} ms",
                    config.ingest.request_timeout_ms
                );
                println!();
                println!("[Flush]");
                println!("  Max batch size:   {}", config.flush.max_batch_size);
                println!("  Idle timeout:     {} ms", config.flush.idle_timeout_ms);
                println!();
                println!("[Cache]");
                println!("  Path:             {}", config.cache_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

async fn handle_drain(config: &Config, cmd: &DrainCommand) -> anyhow::Result<()> {
    let cache = FailureCache::new(config.cache_path());
    let events = cache.load().context("failed to read failure cache")?;

    if events.is_empty() {
        println!("Failure cache is empty; nothing to drain.");
        return Ok(());
    }

    println!(
        "Delivering {} cached event(s) to session {}...",
        events.len(),
        cmd.session
    );

    // The cache can hold several failed batches, so redelivery goes out in
    // chunks the ingest endpoint will accept.
    let ingest = HttpIngest::new(&config.ingest)?;
    let chunk_limit = config.flush.max_batch_size.min(INGEST_BATCH_LIMIT);
    let report = drain_cache(&ingest, &cache, &cmd.session, chunk_limit)
        .await
        .context("failed to drain failure cache")?;

    match report.halted_by {
        None | Some(DeliveryOutcome::Delivered) => {
            println!(
                "Delivered {} event(s). Failure cache cleared.",
                report.delivered
            );
        }
        Some(DeliveryOutcome::SessionGone) => {
            println!(
                "Session {} not found or access denied; {} event(s) left in place.",
                cmd.session, report.remaining
            );
            println!("Use 'keyflow cache clear --yes' to discard the events.");
        }
        Some(DeliveryOutcome::Transient(cause)) => {
            println!(
                "Delivery failed after {} event(s): {cause}",
                report.delivered
            );
            println!("{} event(s) left in place; retry later.", report.remaining);
        }
    }
    Ok(())
}
