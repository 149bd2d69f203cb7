//! Submit command handler
//!
//! Copies a job file into the spool under the cluster lock. The counter
//! update, payload copy and control record all happen inside one lock
//! acquisition.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use qlite_client::{LockClient, QueueLock};
use qlite_core::config::{LOCK_TIMEOUT, LockEndpoint};
use qlite_core::domain::job::{ControlRecord, DEFAULT_NICE, Identity, JobId};
use qlite_core::spool::Spool;
use tracing::warn;

use crate::config::Config;

/// Lock id used by submitters
const SUBMIT_LOCK_ID: u32 = 0;

/// Arguments for `ql submit`
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Delete the job file after it was queued
    #[arg(short, long)]
    pub delete: bool,

    /// Do not print the job number
    #[arg(short, long)]
    pub quiet: bool,

    /// Nice value to run the job at (negative values become 0)
    #[arg(short, long, default_value_t = DEFAULT_NICE, allow_negative_numbers = true)]
    pub nice: i32,

    /// Host running the lock service (default: from .qllockdaemon)
    #[arg(short, long)]
    pub lock_host: Option<String>,

    /// Lock service port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Shell script to queue
    pub job_file: PathBuf,
}

/// Handle `ql submit`
pub async fn handle_submit_command(args: SubmitArgs, config: &Config) -> Result<()> {
    let submitter = Identity::current();
    if submitter.overlaps(&config.privileged) {
        anyhow::bail!("jobs cannot be submitted by the privileged account");
    }

    let spool = config.spool()?;
    let endpoint = LockEndpoint::resolve(args.lock_host.as_deref(), args.port, &spool)?;
    let lock = LockClient::connect(&endpoint).await?;

    let submission = Submission::new(&spool, &lock, config.privileged);
    let id = submission.submit(&args.job_file, submitter, args.nice).await?;

    if args.delete {
        if let Err(e) = fs::remove_file(&args.job_file) {
            warn!("Failed to delete {}: {}", args.job_file.display(), e);
        }
    }

    if !args.quiet {
        println!("{} {}", "Submitted job number".green(), id.to_string().bold());
    }

    Ok(())
}

/// Queues job files on one cluster
pub struct Submission<'a> {
    spool: &'a Spool,
    lock: &'a dyn QueueLock,
    privileged: Identity,
    lock_timeout: Duration,
}

impl<'a> Submission<'a> {
    pub fn new(spool: &'a Spool, lock: &'a dyn QueueLock, privileged: Identity) -> Self {
        Self {
            spool,
            lock,
            privileged,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Queues `job_file` to run as `submitter` at `nice`
    ///
    /// The lock is released whether or not queueing succeeded.
    pub async fn submit(&self, job_file: &Path, submitter: Identity, nice: i32) -> Result<JobId> {
        if submitter.overlaps(&self.privileged) {
            anyhow::bail!("jobs cannot be submitted by the privileged account");
        }

        let file_name = fs::canonicalize(job_file)
            .with_context(|| format!("Cannot read job file {}", job_file.display()))?;
        let record = ControlRecord::new(file_name.to_string_lossy(), submitter, nice);

        self.lock
            .acquire(SUBMIT_LOCK_ID, self.lock_timeout)
            .await
            .context("Failed to take the queue lock")?;

        let queued = self.spool.enqueue(&file_name, &record, self.privileged);

        if let Err(e) = self.lock.release(SUBMIT_LOCK_ID).await {
            warn!("Failed to release the queue lock: {}", e);
        }

        Ok(queued?)
    }
}
