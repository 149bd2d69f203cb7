//! Execution types for the QLite runner
//!
//! These types only exist while a claimed job is being run. They are not
//! written to the spool.

use std::path::PathBuf;

use qlite_core::domain::job::Identity;

/// Exit code reported for a job killed by the time limit
pub const TIMEOUT_EXIT_CODE: i32 = 9;

/// Everything needed to start a claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLaunch {
    /// Relocated payload, run with `/bin/sh`
    pub payload: PathBuf,
    /// Login name of the owner
    pub user: String,
    /// Owner's home directory, used as the working directory
    pub home: PathBuf,
    /// uid/gid the job runs as
    pub identity: Identity,
    /// Value passed to `nice -n`; 0 runs the shell directly
    pub nice_adjustment: i32,
}

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Ran to completion with this exit code
    Exited(i32),
    /// Killed by a signal that did not come from the time limit
    Signalled(i32),
    /// Killed by the time limit
    TimedOut,
}

impl JobOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Exited(code) => *code,
            JobOutcome::Signalled(signal) => 128 + signal,
            JobOutcome::TimedOut => TIMEOUT_EXIT_CODE,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, JobOutcome::TimedOut)
    }
}
