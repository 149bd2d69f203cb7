//! Lock service configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use qlite_core::config;
use qlite_core::spool::DEFAULT_SPOOL_DIR;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "qllockd")]
#[command(about = "QLite cluster lock service", long_about = None)]
pub struct Args {
    /// Port to listen on (default: `qlite` in /etc/services, else 5468)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Spool directory holding the machine roster
    #[arg(short, long, env = "QLSPOOLDIR", default_value = DEFAULT_SPOOL_DIR)]
    pub spool_dir: PathBuf,

    /// Run without root and log every exchange
    #[arg(short, long)]
    pub debug: bool,
}

/// Lock service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    /// Directory whose `.machinelist` decides who may connect
    pub spool_dir: PathBuf,

    /// Bound on reading a command and draining a connection
    pub io_timeout: Duration,

    pub debug: bool,
}

impl Config {
    pub fn new(port: u16, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            port,
            spool_dir: spool_dir.into(),
            io_timeout: Duration::from_secs(5),
            debug: false,
        }
    }

    /// Builds the configuration from parsed arguments
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let port = config::lockd_port(args.port)?;
        let mut config = Self::new(port, args.spool_dir);
        config.debug = args.debug;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if !self.spool_dir.is_dir() {
            anyhow::bail!("spool directory {} does not exist", self.spool_dir.display());
        }

        if self.io_timeout.is_zero() {
            anyhow::bail!("io_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Default tracing filter for this configuration
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "qllockd=debug,qlite_core=debug"
        } else {
            "qllockd=info,qlite_core=info"
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(config::DEFAULT_LOCK_PORT, DEFAULT_SPOOL_DIR)
    }
}
