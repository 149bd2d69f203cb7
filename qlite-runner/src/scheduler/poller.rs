//! Job poller
//!
//! One worker instance's loop over the shared queue:
//!
//! 1. a `.kill<host>` flag acknowledges with `.shutdown<host>` and stops
//! 2. a `.qlsuspend` flag sleeps without touching the lock
//! 3. otherwise take the cluster lock, claim the first waiting job, and
//!    release the lock before running it
//!
//! The lock is only ever held for the scan and the claim, never while a
//! job runs. Failures of a single job are logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use qlite_client::QueueLock;
use qlite_core::domain::running::RunningStatus;
use qlite_core::host::{self, Account};
use qlite_core::spool::{ClaimedJob, Spool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::execution::JobLaunch;
use crate::service::{ExecutionService, Notifier};

/// Where the worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Suspended,
    ShuttingDown,
    Terminated,
}

/// What the loop does after one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Sleep(Duration),
    Stop,
}

/// Result of looking for work while holding the lock
#[derive(Debug)]
enum Claim {
    Empty,
    /// A job was found but thrown away
    Discarded,
    Claimed(ClaimedJob),
}

/// Looks up the password entry for a uid
pub type AccountLookup = fn(u32) -> Option<Account>;

/// Worker loop that polls the spool and runs one job at a time
pub struct JobPoller {
    config: Config,
    spool: Spool,
    lock: Arc<dyn QueueLock>,
    executor: Arc<dyn ExecutionService>,
    notifier: Arc<dyn Notifier>,
    accounts: AccountLookup,
    shutdown: CancellationToken,
    state: WorkerState,
    pid: u32,
}

impl JobPoller {
    pub fn new(
        config: Config,
        lock: Arc<dyn QueueLock>,
        executor: Arc<dyn ExecutionService>,
        notifier: Arc<dyn Notifier>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            spool: config.spool(),
            config,
            lock,
            executor,
            notifier,
            accounts: host::account_for_uid,
            shutdown,
            state: WorkerState::Running,
            pid: std::process::id(),
        }
    }

    pub fn with_account_lookup(mut self, accounts: AccountLookup) -> Self {
        self.accounts = accounts;
        self
    }

    /// Clears leftovers from a previous run on this host
    ///
    /// Stale shutdown flags would stop the worker straight away and a
    /// stale running-status file would show a job that no longer runs.
    pub fn prepare(&self) -> Result<()> {
        self.spool
            .clear_shutdown_flags(&self.config.hostname)
            .context("Failed to clear shutdown flags")?;
        self.spool
            .clear_running(&self.config.hostname, self.config.instance)
            .context("Failed to clear running-status file")?;
        Ok(())
    }

    /// Runs until a shutdown flag or signal stops the worker
    pub async fn run(&mut self) -> WorkerState {
        info!(
            "Worker {}#{} polling {} (interval: {:?})",
            self.config.hostname,
            self.config.instance,
            self.spool.root().display(),
            self.config.poll_interval
        );

        loop {
            match self.poll_once().await {
                Step::Stop => break,
                Step::Sleep(pause) => {
                    if !self.pause(pause).await {
                        info!("Stop signal received, leaving poll loop");
                        break;
                    }
                }
            }
        }

        self.state = WorkerState::Terminated;
        self.state
    }

    /// Sleeps unless the shutdown token fires first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Performs a single poll cycle
    ///
    /// A shutdown request leaves the worker `ShuttingDown` with the
    /// acknowledgement written; [`JobPoller::run`] then terminates.
    pub async fn poll_once(&mut self) -> Step {
        let host = &self.config.hostname;

        if self.spool.shutdown_requested(host) {
            info!("Shutdown requested for {}", host);
            self.state = WorkerState::ShuttingDown;
            if let Err(e) = self.spool.acknowledge_shutdown(host) {
                error!("Failed to acknowledge shutdown: {}", e);
            }
            return Step::Stop;
        }

        if self.spool.is_suspended() {
            if self.state != WorkerState::Suspended {
                info!("Queue suspended");
            }
            self.state = WorkerState::Suspended;
            return Step::Sleep(self.config.poll_interval);
        }

        if self.state == WorkerState::Suspended {
            info!("Queue resumed");
        }
        self.state = WorkerState::Running;

        let id = self.config.instance;
        if let Err(e) = self.lock.acquire(id, self.config.lock_timeout).await {
            warn!("Could not take the queue lock: {}", e);
            return Step::Sleep(self.config.poll_interval);
        }

        let claim = self.claim_next();

        if let Err(e) = self.lock.release(id).await {
            error!("Failed to release the queue lock: {}", e);
        }

        match claim {
            Ok(Claim::Empty) => {
                debug!("No job waiting");
                Step::Sleep(self.config.poll_interval)
            }
            Ok(Claim::Discarded) => Step::Sleep(self.config.post_job_pause),
            Ok(Claim::Claimed(job)) => {
                self.execute(job).await;
                Step::Sleep(self.config.post_job_pause)
            }
            Err(e) => {
                error!("Failed to scan the queue: {:#}", e);
                Step::Sleep(self.config.poll_interval)
            }
        }
    }

    /// Finds and relocates the first waiting job; caller holds the lock
    fn claim_next(&self) -> Result<Claim> {
        let Some(id) = self.spool.first_waiting()? else {
            return Ok(Claim::Empty);
        };

        if self.config.verify_control_owner {
            if let Err(e) = self.spool.verify_control_owner(id, self.config.privileged) {
                warn!("Discarding job {}: {}", id, e);
                self.spool.discard(id)?;
                return Ok(Claim::Discarded);
            }
        }

        match self.spool.claim(id, &self.config.work_dir, self.pid) {
            Ok(job) => {
                debug!("Claimed job {} as {}", id, job.tag);
                Ok(Claim::Claimed(job))
            }
            Err(e) => {
                warn!("Discarding job {} that could not be claimed: {}", id, e);
                self.spool.discard(id)?;
                Ok(Claim::Discarded)
            }
        }
    }

    /// Runs a claimed job and cleans up after it, whatever happens
    async fn execute(&self, job: ClaimedJob) {
        if let Err(e) = self.run_claimed(&job).await {
            error!("Job {} abandoned: {:#}", job.tag, e);
        }

        if let Err(e) = job.remove() {
            warn!("Failed to remove artifacts of {}: {}", job.tag, e);
        }
    }

    async fn run_claimed(&self, job: &ClaimedJob) -> Result<()> {
        let record = job.read_control()?;

        if record.owner.overlaps(&self.config.privileged) {
            anyhow::bail!("refusing to run as privileged owner {}", record.owner);
        }

        let account = (self.accounts)(record.owner.uid)
            .with_context(|| format!("no account for uid {}", record.owner.uid))?;

        let priority = record.run_priority(self.config.max_nice);
        let status = RunningStatus {
            job_name: job.tag.clone(),
            file_name: record.file_name.clone(),
            user: account.name.clone(),
            priority,
        };
        self.spool
            .write_running(&self.config.hostname, self.config.instance, &status)
            .context("Failed to write running-status file")?;

        info!(
            "Running job {} ({}) for {} at nice {}",
            job.tag,
            record.file_name,
            account.name,
            status.display_nice()
        );

        let launch = JobLaunch {
            payload: job.payload.clone(),
            user: account.name.clone(),
            home: account.home,
            identity: record.owner,
            nice_adjustment: -priority,
        };
        let outcome = self.executor.run(&launch, self.config.time_limit).await;

        if let Err(e) = self
            .spool
            .clear_running(&self.config.hostname, self.config.instance)
        {
            warn!("Failed to remove running-status file: {}", e);
        }

        let outcome = outcome?;
        if outcome.timed_out() {
            if let Err(e) = self
                .notifier
                .job_out_of_time(&account.name, &record.file_name)
                .await
            {
                warn!("Failed to notify {}: {:#}", account.name, e);
            }
        }

        Ok(())
    }
}
