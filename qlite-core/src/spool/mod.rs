//! Shared spool directory
//!
//! Everything the cluster shares lives in one directory (optionally one
//! numbered subdirectory per cluster):
//!
//! - `<n>.job`, `<n>.ctrl` – queued payload and its control record
//! - `.qllastjob` – last allocated job number
//! - `.machinelist` – roster of worker hosts and instances
//! - `.qllockdaemon` – `<lockhost> <port>` of the lock service
//! - `.<host>.running.<instance>` – what a worker is running right now
//! - `.kill<host>`, `.shutdown<host>`, `.qlsuspend` – control flags
//!
//! Flags carry meaning only through their existence. Structural changes to
//! the queue (numbering, claiming) must happen under the cluster lock; the
//! per-host files are only ever written by their own host.

mod queue;

pub use queue::ClaimedJob;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::roster::{self, RosterEntry};
use crate::domain::running::RunningStatus;
use crate::error::SpoolError;

/// Default base spool directory
pub const DEFAULT_SPOOL_DIR: &str = "/var/spool/qlite";

/// Highest numbered cluster subdirectory the reporter looks for
pub const MAX_CLUSTER: u32 = 100;

pub type Result<T> = std::result::Result<T, SpoolError>;

/// One cluster's spool directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spool {
    root: PathBuf,
}

impl Spool {
    /// Uses `root` directly as the spool directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Spool for `cluster` under `base`; cluster 0 is the base itself
    pub fn for_cluster(base: impl AsRef<Path>, cluster: u32) -> Self {
        let base = base.as_ref();
        if cluster == 0 {
            Self::new(base)
        } else {
            Self::new(base.join(cluster.to_string()))
        }
    }

    /// Like [`Spool::for_cluster`] but fails if the directory is missing
    pub fn open(base: impl AsRef<Path>, cluster: u32) -> Result<Self> {
        let spool = Self::for_cluster(base, cluster);
        if !spool.exists() {
            return Err(SpoolError::MissingSpool(spool.root));
        }
        Ok(spool)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    // =========================================================================
    // Paths
    // =========================================================================

    pub fn counter_path(&self) -> PathBuf {
        self.root.join(".qllastjob")
    }

    pub fn roster_path(&self) -> PathBuf {
        self.root.join(".machinelist")
    }

    pub fn lock_daemon_path(&self) -> PathBuf {
        self.root.join(".qllockdaemon")
    }

    pub fn running_path(&self, host: &str, instance: u32) -> PathBuf {
        self.root.join(roster::running_file_name(host, instance))
    }

    pub fn kill_flag_path(&self, host: &str) -> PathBuf {
        self.root.join(format!(".kill{}", host))
    }

    pub fn shutdown_flag_path(&self, host: &str) -> PathBuf {
        self.root.join(format!(".shutdown{}", host))
    }

    pub fn suspend_flag_path(&self) -> PathBuf {
        self.root.join(".qlsuspend")
    }

    // =========================================================================
    // Control flags
    // =========================================================================

    /// Is the whole cluster suspended?
    pub fn is_suspended(&self) -> bool {
        self.suspend_flag_path().exists()
    }

    pub fn suspend(&self) -> Result<()> {
        touch(&self.suspend_flag_path())
    }

    pub fn resume(&self) -> Result<()> {
        remove_if_exists(&self.suspend_flag_path())
    }

    /// Has an operator asked the worker on `host` to stop?
    pub fn shutdown_requested(&self, host: &str) -> bool {
        self.kill_flag_path(host).exists()
    }

    pub fn request_shutdown(&self, host: &str) -> Result<()> {
        touch(&self.kill_flag_path(host))
    }

    /// Written by a worker once it has stopped
    pub fn acknowledge_shutdown(&self, host: &str) -> Result<()> {
        touch(&self.shutdown_flag_path(host))
    }

    pub fn shutdown_acknowledged(&self, host: &str) -> bool {
        self.shutdown_flag_path(host).exists()
    }

    /// Removes both shutdown flags for `host`
    pub fn clear_shutdown_flags(&self, host: &str) -> Result<()> {
        remove_if_exists(&self.kill_flag_path(host))?;
        remove_if_exists(&self.shutdown_flag_path(host))
    }

    // =========================================================================
    // Running-status files
    // =========================================================================

    pub fn write_running(&self, host: &str, instance: u32, status: &RunningStatus) -> Result<()> {
        let path = self.running_path(host, instance);
        fs::write(&path, status.render()).map_err(|e| SpoolError::io(&path, e))
    }

    pub fn clear_running(&self, host: &str, instance: u32) -> Result<()> {
        remove_if_exists(&self.running_path(host, instance))
    }

    /// Reads a running-status file, `None` if the instance is idle
    pub fn read_running(&self, host: &str, instance: u32) -> Result<Option<RunningStatus>> {
        let path = self.running_path(host, instance);
        let Some(text) = read_optional(&path)? else {
            return Ok(None);
        };
        RunningStatus::parse(&text)
            .map(Some)
            .map_err(|e| SpoolError::malformed(&path, e))
    }

    // =========================================================================
    // Cluster configuration files
    // =========================================================================

    /// Reads `.machinelist`; a missing file is an empty roster
    pub fn read_roster(&self) -> Result<Vec<RosterEntry>> {
        let path = self.roster_path();
        match read_optional(&path)? {
            Some(text) => roster::parse_roster(&text).map_err(|e| SpoolError::malformed(&path, e)),
            None => Ok(Vec::new()),
        }
    }

    /// Reads `.qllockdaemon` as `(host, port)`
    ///
    /// The port is optional; an unparsable port is treated as absent.
    pub fn read_lock_daemon(&self) -> Result<Option<(String, Option<u16>)>> {
        let Some(text) = read_optional(&self.lock_daemon_path())? else {
            return Ok(None);
        };

        let mut parts = text.split_whitespace();
        let Some(host) = parts.next() else {
            return Ok(None);
        };
        let port = parts.next().and_then(|p| p.parse::<u16>().ok());

        Ok(Some((host.to_string(), port)))
    }
}

/// Creates an empty file, leaving an existing one untouched
pub(crate) fn touch(path: &Path) -> Result<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| SpoolError::io(path, e))
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SpoolError::io(path, e)),
    }
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SpoolError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spool() -> (TempDir, Spool) {
        let dir = TempDir::new().unwrap();
        let spool = Spool::new(dir.path());
        (dir, spool)
    }

    #[test]
    fn test_cluster_paths() {
        let base = Path::new("/var/spool/qlite");
        assert_eq!(Spool::for_cluster(base, 0).root(), base);
        assert_eq!(
            Spool::for_cluster(base, 3).root(),
            Path::new("/var/spool/qlite/3")
        );
    }

    #[test]
    fn test_open_missing_cluster() {
        let (dir, _) = spool();
        let err = Spool::open(dir.path(), 7).unwrap_err();
        assert!(matches!(err, SpoolError::MissingSpool(_)));
    }

    #[test]
    fn test_suspend_and_resume() {
        let (_dir, spool) = spool();

        assert!(!spool.is_suspended());
        spool.suspend().unwrap();
        assert!(spool.is_suspended());
        spool.resume().unwrap();
        assert!(!spool.is_suspended());

        // Resuming twice is harmless
        spool.resume().unwrap();
    }

    #[test]
    fn test_shutdown_flags() {
        let (_dir, spool) = spool();

        spool.request_shutdown("node01").unwrap();
        assert!(spool.shutdown_requested("node01"));
        assert!(!spool.shutdown_requested("node02"));

        spool.acknowledge_shutdown("node01").unwrap();
        assert!(spool.shutdown_acknowledged("node01"));

        spool.clear_shutdown_flags("node01").unwrap();
        assert!(!spool.shutdown_requested("node01"));
        assert!(!spool.shutdown_acknowledged("node01"));
    }

    #[test]
    fn test_running_file_lifecycle() {
        let (_dir, spool) = spool();
        let status = RunningStatus {
            job_name: "100.1".to_string(),
            file_name: "/home/alice/analysis.sh".to_string(),
            user: "alice".to_string(),
            priority: -10,
        };

        assert_eq!(spool.read_running("node01", 1).unwrap(), None);

        spool.write_running("node01", 1, &status).unwrap();
        assert!(spool.root().join(".node01.running.1").exists());
        assert_eq!(spool.read_running("node01", 1).unwrap(), Some(status));

        spool.clear_running("node01", 1).unwrap();
        assert_eq!(spool.read_running("node01", 1).unwrap(), None);
    }

    #[test]
    fn test_read_roster_missing_is_empty() {
        let (_dir, spool) = spool();
        assert!(spool.read_roster().unwrap().is_empty());
    }

    #[test]
    fn test_read_lock_daemon() {
        let (_dir, spool) = spool();
        assert_eq!(spool.read_lock_daemon().unwrap(), None);

        fs::write(spool.lock_daemon_path(), "lockhost 6000\n").unwrap();
        assert_eq!(
            spool.read_lock_daemon().unwrap(),
            Some(("lockhost".to_string(), Some(6000)))
        );

        fs::write(spool.lock_daemon_path(), "lockhost\n").unwrap();
        assert_eq!(
            spool.read_lock_daemon().unwrap(),
            Some(("lockhost".to_string(), None))
        );
    }
}
