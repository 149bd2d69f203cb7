//! QLite CLI
//!
//! Command-line interface for submitting jobs to a QLite cluster and
//! inspecting or steering its workers.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use qlite_core::spool::DEFAULT_SPOOL_DIR;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ql")]
#[command(about = "QLite batch queue CLI", long_about = None)]
struct Cli {
    /// Base spool directory
    #[arg(long, env = "QLSPOOLDIR", default_value = DEFAULT_SPOOL_DIR)]
    spool_dir: String,

    /// Cluster number (0 is the default cluster)
    #[arg(long, env = "QLCLUSTER", default_value_t = 0)]
    cluster: u32,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::new(cli.spool_dir, cli.cluster);

    handle_command(cli.command, &config).await
}
