//! Conclave - multi-agent coordination substrate.
//!
//! Main entry point for the conclave binary.

use clap::Parser;
use std::process::ExitCode;

mod agent;
mod cli;
mod config;
mod coordinator;
mod dispatch;
mod error;
mod logging;
mod protocol;
mod system;
mod task;

use cli::Commands;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let _guard = match logging::init() {
        Ok((guard, _log_dir)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Parse command line arguments
    let args = Commands::parse();

    // Run the command
    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
