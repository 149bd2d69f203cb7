//! Lock domain types
//!
//! The cluster has exactly one mutual-exclusion flag. It is held by a
//! (host, id) pair and may only be released by that same pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The party currently granted the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    /// Short hostname of the peer that asked for the lock
    pub host: String,
    /// Requester id chosen by the client (worker instance, 0 for submitters)
    pub id: u32,
}

impl Holder {
    pub fn new(host: impl Into<String>, id: u32) -> Self {
        Self {
            host: host.into(),
            id,
        }
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.host, self.id)
    }
}

/// State of the cluster-wide lock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    #[default]
    Unlocked,
    Locked(Holder),
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked(_))
    }

    pub fn holder(&self) -> Option<&Holder> {
        match self {
            LockStatus::Locked(holder) => Some(holder),
            LockStatus::Unlocked => None,
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Unlocked => write!(f, "Unlocked"),
            LockStatus::Locked(holder) => write!(f, "Locked by {}", holder),
        }
    }
}
