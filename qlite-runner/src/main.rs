//! QLite Runner
//!
//! A worker daemon that runs queued jobs on one host. Several instances
//! may run side by side, each with its own instance number.
//!
//! Architecture:
//! - Configuration: command-line flags with environment fallbacks
//! - Services: process supervision and time-limit notification
//! - Scheduler: spool polling under the cluster lock
//!
//! The lock is held only while a job is claimed. Jobs run as their
//! owner, niced and optionally time limited.

mod config;
mod execution;
mod scheduler;
mod service;
mod shutdown;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qlite_client::LockClient;
use qlite_core::config::LockEndpoint;
use qlite_core::host;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, Config};
use crate::scheduler::{JobPoller, WorkerState};
use crate::service::{ProcessExecutionService, SendmailNotifier};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(state) => info!("Worker stopped ({:?})", state),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("qlrun: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<WorkerState> {
    let args = Args::parse();
    let hostname = host::local_short_hostname().context("Failed to determine hostname")?;
    let config = Config::from_args(args, hostname);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !config.debug && !host::running_as_root() {
        anyhow::bail!("qlrun must be run by the root user");
    }

    config.validate().context("Invalid configuration")?;

    info!(
        "Starting QLite runner {}#{} on cluster {}",
        config.hostname, config.instance, config.cluster
    );

    let spool = config.spool();
    let endpoint = LockEndpoint::resolve(config.lock_host.as_deref(), config.lock_port, &spool)?;
    let lock = LockClient::connect(&endpoint)
        .await
        .with_context(|| format!("Failed to resolve lock service {}", endpoint))?;
    info!("Using lock service at {}", endpoint);

    let notifier = SendmailNotifier::from_command_line(&config.sendmail)?;
    match config.time_limit {
        Some(limit) => info!("Jobs are limited to {:?}", limit),
        None => info!("Jobs run without a time limit"),
    }
    info!("Jobs run at nice {} or lower priority", config.max_nice);

    let shutdown =
        shutdown::install_shutdown_handler().context("Failed to install signal handlers")?;

    let mut poller = JobPoller::new(
        config,
        Arc::new(lock),
        Arc::new(ProcessExecutionService::new()),
        Arc::new(notifier),
        shutdown,
    );
    poller.prepare()?;

    Ok(poller.run().await)
}
