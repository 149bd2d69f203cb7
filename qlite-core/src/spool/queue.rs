//! Queue operations on the spool
//!
//! Numbering and claiming change the shared job set, so callers must hold
//! the cluster lock around [`Spool::enqueue`] and [`Spool::claim`].

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};
use tracing::{debug, warn};

use super::{Result, Spool, read_optional, remove_if_exists};
use crate::domain::job::{ControlRecord, Identity, JobId};
use crate::error::SpoolError;

const JOB_SUFFIX: &str = "job";
const CONTROL_SUFFIX: &str = "ctrl";

/// A job moved out of the spool into a worker's private work area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: JobId,
    /// `<pid>.<job>`, unique across concurrent workers sharing a work dir
    pub tag: String,
    /// Relocated payload (`<tag>.run`)
    pub payload: PathBuf,
    /// Relocated control record (`<tag>.stat`)
    pub control: PathBuf,
}

impl ClaimedJob {
    pub fn read_control(&self) -> Result<ControlRecord> {
        let text = fs::read_to_string(&self.control).map_err(|e| SpoolError::io(&self.control, e))?;
        ControlRecord::parse(&text).map_err(|e| SpoolError::malformed(&self.control, e))
    }

    /// Deletes the relocated payload and control record
    pub fn remove(&self) -> Result<()> {
        remove_if_exists(&self.payload)?;
        remove_if_exists(&self.control)
    }
}

impl Spool {
    pub fn job_path(&self, id: JobId) -> PathBuf {
        self.root().join(format!("{}.{}", id, JOB_SUFFIX))
    }

    pub fn control_path(&self, id: JobId) -> PathBuf {
        self.root().join(format!("{}.{}", id, CONTROL_SUFFIX))
    }

    /// Last allocated job number, 0 for a fresh spool
    ///
    /// An unreadable counter is treated as 0 so the queue keeps working.
    pub fn last_job_id(&self) -> Result<JobId> {
        let path = self.counter_path();
        let Some(text) = read_optional(&path)? else {
            return Ok(JobId(0));
        };

        match text.parse::<JobId>() {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!("Ignoring unparsable job counter {}: {}", path.display(), e);
                Ok(JobId(0))
            }
        }
    }

    /// Allocates and persists the next job number
    ///
    /// Must be called under the cluster lock.
    pub fn allocate_job_id(&self) -> Result<JobId> {
        let id = self.last_job_id()?.next();
        let path = self.counter_path();
        fs::write(&path, format!("{}\n", id)).map_err(|e| SpoolError::io(&path, e))?;
        Ok(id)
    }

    /// Adds a job to the queue and returns its number
    ///
    /// The counter is persisted before the payload is copied and is not
    /// rolled back if the copy fails, so a failed submission skips a number.
    /// Must be called under the cluster lock.
    pub fn enqueue(
        &self,
        payload: &Path,
        record: &ControlRecord,
        privileged: Identity,
    ) -> Result<JobId> {
        self.enqueue_with(payload, record, privileged, change_owner)
    }

    /// [`Spool::enqueue`] with the ownership change supplied by the caller
    ///
    /// The control file must end up owned by `privileged`, otherwise every
    /// worker would discard the job. If that fails the job is removed again
    /// and the error returned. A payload that keeps the submitter's
    /// ownership only earns a warning.
    pub(crate) fn enqueue_with<F>(
        &self,
        payload: &Path,
        record: &ControlRecord,
        privileged: Identity,
        chown: F,
    ) -> Result<JobId>
    where
        F: Fn(&Path, Identity) -> io::Result<()>,
    {
        if record.owner.overlaps(&privileged) {
            return Err(SpoolError::PrivilegedOwner(self.last_job_id()?.next()));
        }

        let id = self.allocate_job_id()?;

        let job_path = self.job_path(id);
        fs::copy(payload, &job_path).map_err(|e| SpoolError::io(payload, e))?;
        if let Err(e) = chown(&job_path, record.owner) {
            warn!("Cannot change owner of {} to {}: {}", job_path.display(), record.owner, e);
        }

        let control_path = self.control_path(id);
        let written = fs::write(&control_path, record.render())
            .map_err(|e| SpoolError::io(&control_path, e))
            .and_then(|()| {
                chown(&control_path, privileged).map_err(|source| SpoolError::Ownership {
                    path: control_path.clone(),
                    owner: privileged,
                    source,
                })
            });
        if let Err(e) = written {
            let _ = self.discard(id);
            return Err(e);
        }

        debug!("Queued {} as job {} in {}", record.file_name, id, self.root().display());
        Ok(id)
    }

    /// Jobs waiting in the queue, in directory order
    pub fn waiting_jobs(&self) -> Result<Vec<JobId>> {
        let entries = fs::read_dir(self.root()).map_err(|e| SpoolError::io(self.root(), e))?;

        let mut jobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SpoolError::io(self.root(), e))?;
            if let Some(id) = control_file_id(&entry.file_name().to_string_lossy()) {
                jobs.push(id);
            }
        }
        Ok(jobs)
    }

    /// First waiting job in directory order
    ///
    /// No ordering by number or age is applied; whichever control file the
    /// directory yields first wins.
    pub fn first_waiting(&self) -> Result<Option<JobId>> {
        let entries = fs::read_dir(self.root()).map_err(|e| SpoolError::io(self.root(), e))?;

        for entry in entries {
            let entry = entry.map_err(|e| SpoolError::io(self.root(), e))?;
            if let Some(id) = control_file_id(&entry.file_name().to_string_lossy()) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn read_control(&self, id: JobId) -> Result<ControlRecord> {
        let path = self.control_path(id);
        let text = fs::read_to_string(&path).map_err(|e| SpoolError::io(&path, e))?;
        ControlRecord::parse(&text).map_err(|e| SpoolError::malformed(&path, e))
    }

    /// Checks that the control file was written by the privileged account
    pub fn verify_control_owner(&self, id: JobId, privileged: Identity) -> Result<()> {
        let path = self.control_path(id);
        let meta = fs::metadata(&path).map_err(|e| SpoolError::io(&path, e))?;
        if meta.uid() != privileged.uid {
            return Err(SpoolError::UntrustedControlFile(path));
        }
        Ok(())
    }

    /// Removes a job from the queue without running it
    pub fn discard(&self, id: JobId) -> Result<()> {
        remove_if_exists(&self.job_path(id))?;
        remove_if_exists(&self.control_path(id))
    }

    /// Moves a waiting job into `work_dir`, tagged with `pid`
    ///
    /// Must be called under the cluster lock.
    pub fn claim(&self, id: JobId, work_dir: &Path, pid: u32) -> Result<ClaimedJob> {
        let tag = format!("{}.{}", pid, id);
        let claimed = ClaimedJob {
            id,
            payload: work_dir.join(format!("{}.run", tag)),
            control: work_dir.join(format!("{}.stat", tag)),
            tag,
        };

        relocate(&self.job_path(id), &claimed.payload)?;
        if let Err(e) = relocate(&self.control_path(id), &claimed.control) {
            let _ = remove_if_exists(&claimed.payload);
            return Err(e);
        }

        Ok(claimed)
    }
}

/// Parses `<n>.ctrl` into a job number
fn control_file_id(name: &str) -> Option<JobId> {
    let (stem, suffix) = name.rsplit_once('.')?;
    if suffix != CONTROL_SUFFIX {
        return None;
    }
    match stem.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(JobId(n)),
    }
}

/// Rename, or copy and remove when the work area is on another filesystem
fn relocate(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SpoolError::io(from, e)),
        Err(e) => {
            debug!("Rename of {} failed ({}), copying instead", from.display(), e);
            fs::copy(from, to).map_err(|e| SpoolError::io(to, e))?;
            fs::remove_file(from).map_err(|e| SpoolError::io(from, e))
        }
    }
}

fn change_owner(path: &Path, owner: Identity) -> io::Result<()> {
    let uid = Some(Uid::from_raw(owner.uid));
    let gid = Some(Gid::from_raw(owner.gid));
    nix::unistd::chown(path, uid, gid).map_err(io::Error::from)
}
