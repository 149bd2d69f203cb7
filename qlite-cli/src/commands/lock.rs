//! Lock command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use qlite_client::LockClient;
use qlite_core::config::LockEndpoint;
use qlite_core::domain::lock::LockStatus;

use crate::config::Config;

/// Lock subcommands
#[derive(Subcommand)]
pub enum LockCommands {
    /// Show who holds the cluster lock
    Status {
        /// Host running the lock service (default: from .qllockdaemon)
        #[arg(short, long)]
        lock_host: Option<String>,

        /// Lock service port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Handle lock commands
pub async fn handle_lock_command(command: LockCommands, config: &Config) -> Result<()> {
    match command {
        LockCommands::Status { lock_host, port } => {
            let spool = config.spool()?;
            let endpoint = LockEndpoint::resolve(lock_host.as_deref(), port, &spool)?;
            let client = LockClient::connect(&endpoint).await?;

            let status = client.status().await?;
            println!("{} {}", endpoint.to_string().dimmed(), colorize_status(&status));
            Ok(())
        }
    }
}

fn colorize_status(status: &LockStatus) -> ColoredString {
    match status {
        LockStatus::Unlocked => status.to_string().green(),
        LockStatus::Locked(_) => status.to_string().yellow(),
    }
}
