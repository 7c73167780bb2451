//! CLI commands for conclave using clap.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{load_settings_from, load_settings_or_default, Settings};
use crate::system::System;

/// Conclave - multi-agent coordination substrate.
#[derive(Parser)]
#[command(name = "conclave")]
#[command(version = "0.1.0")]
#[command(about = "Conclave - message bus and task scheduling for cooperating agents", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a settings file (defaults to ~/.conclave/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the agent system and pump messages until ctrl-c
    Run {
        /// Stop after this many delivery passes instead of running until ctrl-c
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Start the system, print one status snapshot, and stop
    Status,

    /// Validate a settings file
    Check,
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Run { ticks } => cmd_run(self.load_settings()?, *ticks).await,
            Command::Status => cmd_status(self.load_settings()?).await,
            Command::Check => cmd_check(self.config.clone()),
        }
    }

    fn load_settings(&self) -> Result<Settings> {
        match &self.config {
            Some(path) => Ok(load_settings_from(path)?),
            None => Ok(load_settings_or_default()),
        }
    }
}

async fn cmd_run(settings: Settings, ticks: Option<u64>) -> Result<()> {
    let mut system = System::from_settings(settings)?;
    system.start()?;

    let mut interval =
        tokio::time::interval(Duration::from_millis(system.processing_interval_ms()));
    let mut passes: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let delivered = system.pump();
                if delivered > 0 {
                    tracing::debug!("Delivered {} messages", delivered);
                }
                passes += 1;
                if let Some(limit) = ticks {
                    if passes >= limit {
                        tracing::info!("Reached {} delivery passes, stopping", limit);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received ctrl-c, stopping");
                break;
            }
        }
    }

    system.stop()?;
    println!("{}", serde_json::to_string_pretty(&system.status())?);
    Ok(())
}

async fn cmd_status(settings: Settings) -> Result<()> {
    let mut system = System::from_settings(settings)?;
    system.start()?;
    println!("{}", serde_json::to_string_pretty(&system.status())?);
    system.stop()?;
    Ok(())
}

fn cmd_check(config: Option<PathBuf>) -> Result<()> {
    let path = match config {
        Some(path) => path,
        None => crate::config::get_settings_path()?,
    };
    load_settings_from(&path)?;
    println!("Settings OK: {}", path.display());
    Ok(())
}
