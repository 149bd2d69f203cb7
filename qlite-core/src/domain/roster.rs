//! Machine roster
//!
//! `.machinelist` names every (host, instance) pair allowed to take the
//! lock and tracked by the fleet report:
//!
//! ```text
//! # hostname  instance
//! node01 1
//! node01 2
//! ! node02 1    (disabled)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// One worker instance on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Short hostname (no domain)
    pub host: String,
    /// Worker instance number on that host
    pub instance: u32,
}

impl RosterEntry {
    pub fn new(host: impl Into<String>, instance: u32) -> Self {
        Self {
            host: host.into(),
            instance,
        }
    }

    /// Name of the running-status file this instance writes
    pub fn running_file_name(&self) -> String {
        running_file_name(&self.host, self.instance)
    }
}

/// `.<host>.running.<instance>`
pub fn running_file_name(host: &str, instance: u32) -> String {
    format!(".{}.running.{}", host, instance)
}

/// Parses the roster file
///
/// Lines starting with `!` or `#` are ignored, as are blank lines.
/// Any other line must start with a hostname and an instance number.
pub fn parse_roster(text: &str) -> Result<Vec<RosterEntry>, RecordError> {
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        if raw.starts_with('!') || raw.starts_with('#') {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let host = parts.next();
        let instance = parts.next().and_then(|s| s.parse::<u32>().ok());

        match (host, instance) {
            (Some(host), Some(instance)) => entries.push(RosterEntry::new(host, instance)),
            _ => {
                return Err(RecordError::BadRosterLine {
                    line: idx + 1,
                    text: raw.to_string(),
                });
            }
        }
    }

    Ok(entries)
}

/// True if `host` appears anywhere in the roster
pub fn contains_host(roster: &[RosterEntry], host: &str) -> bool {
    roster.iter().any(|entry| entry.host == host)
}
