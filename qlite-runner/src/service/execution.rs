//! Execution service
//!
//! Runs a claimed job as its owner and, when a time limit is set, enforces
//! it with an independent timer task:
//!
//! - the job is spawned in a process group of its own
//! - a timer task sleeps until the deadline and then kills the whole group
//! - the service waits for the job; if the timer is still pending it is
//!   aborted, and either way it is awaited before returning
//!
//! The kill path never depends on the wait, so a job that ignores signals
//! or spins on the CPU is still terminated on time.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::execution::{JobLaunch, JobOutcome};

const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_NICE: &str = "nice";
const JOB_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Service trait for running claimed jobs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs a job to completion, or until `time_limit` elapses
    async fn run(&self, launch: &JobLaunch, time_limit: Option<Duration>) -> Result<JobOutcome>;
}

/// Runs jobs as local processes
pub struct ProcessExecutionService {
    shell: PathBuf,
    nice: PathBuf,
}

impl ProcessExecutionService {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            nice: PathBuf::from(DEFAULT_NICE),
        }
    }

    /// Builds the command for a job without starting it
    fn command(&self, launch: &JobLaunch) -> Command {
        let mut cmd = if launch.nice_adjustment != 0 {
            let mut cmd = Command::new(&self.nice);
            cmd.arg("-n")
                .arg(launch.nice_adjustment.to_string())
                .arg(&self.shell);
            cmd
        } else {
            Command::new(&self.shell)
        };

        cmd.arg(&launch.payload)
            .env_clear()
            .env("HOME", &launch.home)
            .env("USER", &launch.user)
            .env("LOGNAME", &launch.user)
            .env("SHELL", &self.shell)
            .env("PATH", JOB_PATH)
            .current_dir(&launch.home)
            .uid(launch.identity.uid)
            .gid(launch.identity.gid)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        cmd
    }
}

impl Default for ProcessExecutionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionService for ProcessExecutionService {
    async fn run(&self, launch: &JobLaunch, time_limit: Option<Duration>) -> Result<JobOutcome> {
        let mut child = self
            .command(launch)
            .spawn()
            .with_context(|| format!("Failed to start {}", launch.payload.display()))?;

        let pid = child
            .id()
            .context("Job exited before its process id could be read")?;
        debug!("Started {} as pid {}", launch.payload.display(), pid);

        let timer = time_limit.map(|limit| spawn_timer(pid, limit));

        let status = child.wait().await;

        let timed_out = match timer {
            Some(timer) => {
                timer.abort();
                matches!(timer.await, Ok(true))
            }
            None => false,
        };

        let status = status.context("Failed to wait for job")?;
        let outcome = outcome(status, timed_out);
        info!(
            "Job {} finished with exit code {}",
            launch.payload.display(),
            outcome.exit_code()
        );
        Ok(outcome)
    }
}

/// Kills the process group led by `pid` once `limit` has passed
///
/// Resolves to `true` only if it actually delivered the kill.
fn spawn_timer(pid: u32, limit: Duration) -> JoinHandle<bool> {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                warn!("Job pid {} exceeded its time limit of {:?}, killed", pid, limit);
                true
            }
            Err(e) => {
                debug!("Time limit reached but job group {} is gone: {}", pid, e);
                false
            }
        }
    })
}

fn outcome(status: ExitStatus, timed_out: bool) -> JobOutcome {
    if timed_out {
        return JobOutcome::TimedOut;
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => JobOutcome::Exited(code),
        (None, Some(signal)) => JobOutcome::Signalled(signal),
        (None, None) => JobOutcome::Exited(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlite_core::domain::job::Identity;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn launch(dir: &TempDir, script: &str, nice_adjustment: i32) -> JobLaunch {
        let payload = dir.path().join("1.1.run");
        fs::write(&payload, script).unwrap();
        JobLaunch {
            payload,
            user: "tester".to_string(),
            home: dir.path().to_path_buf(),
            identity: Identity::current(),
            nice_adjustment,
        }
    }

    #[tokio::test]
    async fn test_fast_job_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let service = ProcessExecutionService::new();

        let outcome = service
            .run(&launch(&dir, "exit 3\n", 0), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Exited(3));
    }

    #[tokio::test]
    async fn test_job_runs_in_home_with_owner_environment() {
        let dir = TempDir::new().unwrap();
        let service = ProcessExecutionService::new();
        let script = "echo \"$USER $LOGNAME\" > out.txt\n";

        let outcome = service.run(&launch(&dir, script, 0), None).await.unwrap();

        assert_eq!(outcome, JobOutcome::Exited(0));
        let out = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "tester tester");
    }

    #[tokio::test]
    async fn test_slow_job_is_killed_at_limit() {
        let dir = TempDir::new().unwrap();
        let service = ProcessExecutionService::new();
        let start = Instant::now();

        let outcome = service
            .run(&launch(&dir, "sleep 30\n", 0), Some(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::TimedOut);
        assert_eq!(outcome.exit_code(), 9);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_niced_job() {
        let dir = TempDir::new().unwrap();
        let service = ProcessExecutionService::new();
        let script = "nice > nice.txt\n";

        let outcome = service.run(&launch(&dir, script, 5), None).await.unwrap();

        assert_eq!(outcome, JobOutcome::Exited(0));
        let level: i32 = fs::read_to_string(dir.path().join("nice.txt"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(level >= 5);
    }

    #[tokio::test]
    async fn test_missing_shell_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let service = ProcessExecutionService {
            shell: dir.path().join("no-such-shell"),
            nice: PathBuf::from(DEFAULT_NICE),
        };

        assert!(service.run(&launch(&dir, "true\n", 0), None).await.is_err());
    }
}
