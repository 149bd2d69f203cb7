//! Runner configuration
//!
//! Defines all configurable parameters for a worker instance: where the
//! queue lives, how jobs are run, and the polling cadence.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use qlite_core::config::{LOCK_TIMEOUT, POLL_INTERVAL, POST_JOB_PAUSE};
use qlite_core::domain::job::Identity;
use qlite_core::spool::{DEFAULT_SPOOL_DIR, Spool};

use crate::service::DEFAULT_SENDMAIL;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "qlrun")]
#[command(about = "QLite worker daemon", long_about = None)]
pub struct Args {
    /// Base spool directory
    #[arg(short, long, env = "QLSPOOLDIR", default_value = DEFAULT_SPOOL_DIR)]
    pub spool_dir: PathBuf,

    /// Cluster number (0 is the default cluster)
    #[arg(short, long, env = "QLCLUSTER", default_value_t = 0)]
    pub cluster: u32,

    /// Instance number of this worker on this host
    #[arg(short, long, default_value_t = 1)]
    pub instance: u32,

    /// Lowest priority jobs may run at on this host (nice value)
    #[arg(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
    pub max_nice: i32,

    /// Time limit per job in minutes (0 = unlimited)
    #[arg(short, long, default_value_t = 0)]
    pub time_limit: u64,

    /// Host running the lock service (default: from .qllockdaemon)
    #[arg(short, long)]
    pub lock_host: Option<String>,

    /// Lock service port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory jobs are moved to while they run
    #[arg(long, default_value = "/tmp")]
    pub work_dir: PathBuf,

    /// Mail command used for time limit notices
    #[arg(long, default_value = DEFAULT_SENDMAIL)]
    pub sendmail: String,

    /// Run without root and log every step
    #[arg(short, long)]
    pub debug: bool,
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Cluster spool directory (base plus cluster subdirectory)
    pub spool_dir: PathBuf,

    pub cluster: u32,

    /// Lock id this worker uses, and the suffix of its running-status file
    pub instance: u32,

    /// Short hostname used for flag and running-status file names
    pub hostname: String,

    /// Jobs never run at a better priority than this nice value
    pub max_nice: i32,

    /// Jobs running longer than this are killed
    pub time_limit: Option<Duration>,

    pub work_dir: PathBuf,

    pub sendmail: String,

    pub lock_host: Option<String>,

    pub lock_port: Option<u16>,

    /// Sleep when idle, suspended or unable to lock
    pub poll_interval: Duration,

    /// Pause after each executed job
    pub post_job_pause: Duration,

    /// How long to keep retrying a held lock
    pub lock_timeout: Duration,

    /// Account that must own control files and may never run jobs
    pub privileged: Identity,

    /// Check that control files belong to the privileged account
    pub verify_control_owner: bool,

    pub debug: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(spool_dir: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            cluster: 0,
            instance: 1,
            hostname: hostname.into(),
            max_nice: 0,
            time_limit: None,
            work_dir: PathBuf::from("/tmp"),
            sendmail: DEFAULT_SENDMAIL.to_string(),
            lock_host: None,
            lock_port: None,
            poll_interval: POLL_INTERVAL,
            post_job_pause: POST_JOB_PAUSE,
            lock_timeout: LOCK_TIMEOUT,
            privileged: Identity::ROOT,
            verify_control_owner: true,
            debug: false,
        }
    }

    /// Builds the configuration from parsed arguments
    pub fn from_args(args: Args, hostname: impl Into<String>) -> Self {
        let spool = Spool::for_cluster(&args.spool_dir, args.cluster);

        let mut config = Self::new(spool.root(), hostname);
        config.cluster = args.cluster;
        config.instance = args.instance;
        config.max_nice = args.max_nice.max(0);
        config.time_limit = match args.time_limit {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        };
        config.work_dir = args.work_dir;
        config.sendmail = args.sendmail;
        config.lock_host = args.lock_host;
        config.lock_port = args.port;
        config.debug = args.debug;
        config
    }

    pub fn spool(&self) -> Spool {
        Spool::new(&self.spool_dir)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hostname.is_empty() {
            anyhow::bail!("hostname cannot be empty");
        }

        if !self.spool_dir.is_dir() {
            anyhow::bail!("spool directory {} does not exist", self.spool_dir.display());
        }

        if !self.work_dir.is_dir() {
            anyhow::bail!("work directory {} does not exist", self.work_dir.display());
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.sendmail.trim().is_empty() {
            anyhow::bail!("sendmail command cannot be empty");
        }

        Ok(())
    }

    /// Default tracing filter for this configuration
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "qlrun=debug,qlite_core=debug,qlite_client=debug"
        } else {
            "qlrun=info,qlite_core=info,qlite_client=info"
        }
    }
}
