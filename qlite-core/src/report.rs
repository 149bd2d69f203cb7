//! Fleet introspection
//!
//! Read-only view of queued and running jobs. Nothing here takes the lock,
//! so a job being claimed may briefly show up both queued and running.

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::domain::job::{Identity, JobId};
use crate::error::SpoolError;
use crate::host;
use crate::spool::{MAX_CLUSTER, Spool};

/// A job waiting in a cluster queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub file_name: String,
    pub owner: Identity,
    /// `user:group` of the owner
    pub owner_label: String,
    pub nice: i32,
}

/// Waiting jobs of one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterQueue {
    /// 0 is the default cluster
    pub cluster: u32,
    pub jobs: Vec<QueuedJob>,
}

impl ClusterQueue {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }
}

/// A job executing on a roster instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningJob {
    pub host: String,
    pub instance: u32,
    pub job_name: String,
    pub file_name: String,
    pub user: String,
    /// Nice value with the stored sign inverted back
    pub nice: i32,
}

/// Everything `ql list` shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetReport {
    pub clusters: Vec<ClusterQueue>,
    pub running: Vec<RunningJob>,
}

impl FleetReport {
    pub fn total_waiting(&self) -> usize {
        self.clusters.iter().map(ClusterQueue::total).sum()
    }
}

/// Which clusters to report on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSelection {
    /// The default cluster plus every numbered cluster that exists
    All,
    One(u32),
}

/// Collects waiting jobs for the selected clusters under `base`
pub fn collect_queues(
    base: &Path,
    selection: ClusterSelection,
    privileged: Identity,
) -> Result<Vec<ClusterQueue>, SpoolError> {
    match selection {
        ClusterSelection::One(cluster) => {
            let spool = Spool::open(base, cluster)?;
            Ok(vec![collect_cluster(&spool, cluster, privileged)?])
        }
        ClusterSelection::All => {
            let mut queues = vec![collect_cluster(&Spool::open(base, 0)?, 0, privileged)?];
            for cluster in 1..=MAX_CLUSTER {
                let spool = Spool::for_cluster(base, cluster);
                if spool.exists() {
                    queues.push(collect_cluster(&spool, cluster, privileged)?);
                }
            }
            Ok(queues)
        }
    }
}

/// Collects the waiting jobs of one spool
///
/// Suspicious control files are reported but still listed. Jobs that vanish
/// or cannot be parsed while scanning are skipped.
pub fn collect_cluster(
    spool: &Spool,
    cluster: u32,
    privileged: Identity,
) -> Result<ClusterQueue, SpoolError> {
    let mut jobs = Vec::new();

    for id in spool.waiting_jobs()? {
        if let Err(e) = spool.verify_control_owner(id, privileged) {
            if e.is_not_found() {
                continue;
            }
            warn!("{}", e);
        }

        let record = match spool.read_control(id) {
            Ok(record) => record,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                warn!("Skipping job {}: {}", id, e);
                continue;
            }
        };

        if record.owner.overlaps(&privileged) {
            warn!("Job {} in {} declares a privileged owner", id, spool.root().display());
        }

        jobs.push(QueuedJob {
            id,
            owner_label: host::owner_label(&record.owner),
            file_name: record.file_name,
            owner: record.owner,
            nice: record.nice,
        });
    }

    Ok(ClusterQueue { cluster, jobs })
}

/// Reads the roster of `spool` and every running-status file it names
pub fn collect_running(spool: &Spool) -> Result<Vec<RunningJob>, SpoolError> {
    let mut running = Vec::new();

    for entry in spool.read_roster()? {
        let status = match spool.read_running(&entry.host, entry.instance) {
            Ok(Some(status)) => status,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        running.push(RunningJob {
            nice: status.display_nice(),
            host: entry.host,
            instance: entry.instance,
            job_name: status.job_name,
            file_name: status.file_name,
            user: status.user,
        });
    }

    Ok(running)
}
