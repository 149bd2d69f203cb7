//! Configuration module
//!
//! Settings shared by every `ql` command: where the spool lives and which
//! cluster to act on.

use std::path::PathBuf;

use qlite_core::domain::job::Identity;
use qlite_core::spool::Spool;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base spool directory
    pub spool_dir: PathBuf,

    /// Cluster the command acts on (0 is the default cluster)
    pub cluster: u32,

    /// Account that owns control files and may not submit
    pub privileged: Identity,
}

impl Config {
    pub fn new(spool_dir: impl Into<PathBuf>, cluster: u32) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            cluster,
            privileged: Identity::ROOT,
        }
    }

    /// Spool of the selected cluster, failing if it does not exist
    pub fn spool(&self) -> anyhow::Result<Spool> {
        Ok(Spool::open(&self.spool_dir, self.cluster)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cluster_spool() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("3")).unwrap();

        let config = Config::new(dir.path(), 3);
        assert_eq!(config.spool().unwrap().root(), dir.path().join("3"));

        let config = Config::new(dir.path(), 4);
        assert!(config.spool().is_err());
    }
}
