//! CLI module for Relay Cache
//!
//! Administrative subcommands against the configured cache backend. Each
//! invocation builds its own connection, runs one operation, prints JSON to
//! stdout and disconnects. `monitor` keeps running until interrupted.

pub mod monitor;
pub mod ops;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging::init_logging;

/// Relay Cache - inspect and manage the shared AI orchestration cache
#[derive(Debug, Parser)]
#[command(name = "relay-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Probe the backend once and print a health snapshot
    Health,

    /// Print the entry stored under a key
    Get { key: String },

    /// Store a value; non-JSON input is stored as a string
    Set {
        key: String,
        value: String,

        /// TTL in seconds (defaults to the configured TTL, 0 disables expiry)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Delete a key
    Del { key: String },

    /// List keys under the configured prefix
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Delete every key under the configured prefix
    Flush,

    /// Stream health snapshots and connection events until interrupted
    Monitor(monitor::MonitorArgs),
}

/// Loads `.env` and configuration, then installs logging
fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
