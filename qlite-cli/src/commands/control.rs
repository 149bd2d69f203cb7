//! Worker control commands
//!
//! Suspend/resume and shutdown work purely through flag files in the
//! spool, which workers check on every poll.

use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use qlite_core::host;
use qlite_core::spool::Spool;

use crate::config::Config;

/// How often `shutdown --wait` looks for the acknowledgement
const ACK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fails unless `uid`, the real uid of the caller, is the privileged account
fn require_root(uid: u32, config: &Config, action: &str) -> Result<()> {
    if uid != config.privileged.uid {
        anyhow::bail!("only the root user may {}", action);
    }
    Ok(())
}

/// Handle `ql suspend [--resume]`
pub fn handle_suspend_command(resume: bool, config: &Config) -> Result<()> {
    require_root(host::real_uid(), config, "suspend or resume the queue")?;
    let spool = config.spool()?;

    if resume {
        spool.resume()?;
        println!("{} cluster {}", "Resumed".green(), config.cluster);
    } else {
        spool.suspend()?;
        println!(
            "{} cluster {}; running jobs will finish",
            "Suspended".yellow(),
            config.cluster
        );
    }

    Ok(())
}

/// Handle `ql shutdown [-w] [node]`
pub async fn handle_shutdown_command(
    node: Option<String>,
    wait: bool,
    config: &Config,
) -> Result<()> {
    require_root(host::real_uid(), config, "shut down workers")?;
    let spool = config.spool()?;

    let node = match node {
        Some(node) => host::short_name(&node).to_string(),
        None => host::local_short_hostname().context("Failed to determine hostname")?,
    };

    spool.request_shutdown(&node)?;
    println!("{} {}", "Shutdown requested for".bold(), node.cyan());

    if wait {
        println!("{}", "Waiting for the worker to finish its current job...".dimmed());
        wait_for_ack(&spool, &node, ACK_POLL_INTERVAL).await;
        println!("{} {}", "Worker stopped on".green(), node.cyan());
    }

    Ok(())
}

/// Returns once the worker on `node` has written its acknowledgement
async fn wait_for_ack(spool: &Spool, node: &str, interval: Duration) {
    while !spool.shutdown_acknowledged(node) {
        tokio::time::sleep(interval).await;
    }
}
