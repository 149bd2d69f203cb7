//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod control;
mod list;
mod lock;
mod submit;

pub use list::ListArgs;
pub use lock::LockCommands;
pub use submit::SubmitArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a job file to the queue
    Submit(SubmitArgs),
    /// Show waiting and running jobs
    List(ListArgs),
    /// Stop workers from taking new jobs
    Suspend {
        /// Let workers take jobs again
        #[arg(long)]
        resume: bool,
    },
    /// Ask the worker on a host to stop after its current job
    Shutdown {
        /// Wait until the worker has acknowledged
        #[arg(short, long)]
        wait: bool,

        /// Host to stop (default: this host)
        node: Option<String>,
    },
    /// Lock service queries
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit(args) => submit::handle_submit_command(args, config).await,
        Commands::List(args) => list::handle_list_command(args, config),
        Commands::Suspend { resume } => control::handle_suspend_command(resume, config),
        Commands::Shutdown { wait, node } => {
            control::handle_shutdown_command(node, wait, config).await
        }
        Commands::Lock { command } => lock::handle_lock_command(command, config).await,
    }
}
