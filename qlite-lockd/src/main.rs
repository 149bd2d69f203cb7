//! QLite Lock Service
//!
//! Holds the single cluster-wide lock that serialises changes to the
//! shared queue. Only hosts listed in the spool's machine roster are served.

use anyhow::{Context, Result};
use clap::Parser;
use qlite_core::host;
use qlite_core::spool::Spool;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod admission;
mod config;
mod server;
mod service;
mod shutdown;

use admission::{Admission, DnsResolver};
use config::{Args, Config};
use server::LockServer;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        eprintln!("qllockd: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_args(Args::parse())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !config.debug && !host::running_as_root() {
        anyhow::bail!("qllockd must be run by the root user");
    }

    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting QLite lock service...");

    // The roster is read once; restart the service to pick up changes
    let roster = Spool::new(&config.spool_dir)
        .read_roster()
        .context("Failed to read machine roster")?;
    if roster.is_empty() {
        tracing::warn!(
            "Machine roster in {} is empty, every connection will be refused",
            config.spool_dir.display()
        );
    }
    tracing::info!("{} roster entries loaded", roster.len());

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind to port {}", config.port))?;

    let server = LockServer::new(
        listener,
        Admission::new(&roster, Box::new(DnsResolver)),
        config.io_timeout,
    );
    tracing::info!("Listening on {}", server.local_addr()?);

    let shutdown =
        shutdown::install_shutdown_handler().context("Failed to install signal handlers")?;
    server.run(shutdown).await;

    Ok(())
}
