//! Job domain types
//!
//! A queued job is a pair of files in the spool: the verbatim payload
//! `<n>.job` and the control record `<n>.ctrl`. The control record is the
//! only source of truth for who the job runs as and at what priority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// Nice value used when the submitter does not ask for one
pub const DEFAULT_NICE: i32 = 10;

/// Per-cluster job number
///
/// Numbers increase monotonically per cluster and wrap from `u64::MAX`
/// back to 1. Zero is never a valid job number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Returns the number allocated after this one
    pub fn next(self) -> JobId {
        match self.0.wrapping_add(1) {
            0 => JobId(1),
            n => JobId(n),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(JobId)
    }
}

/// A numeric uid/gid pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// The superuser account
    pub const ROOT: Identity = Identity { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Real uid/gid of the calling process
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }

    /// True when either the uid or the gid belongs to `privileged`
    ///
    /// Jobs must never run with the privileged user or group, so a match
    /// on either half is enough to refuse.
    pub fn overlaps(&self, privileged: &Identity) -> bool {
        self.uid == privileged.uid || self.gid == privileged.gid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Contents of a `<n>.ctrl` file
///
/// ```text
/// J: /home/alice/analysis.sh
/// U: 1000
/// G: 100
/// N: 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Absolute path of the file originally submitted
    pub file_name: String,
    /// Account the job runs as
    pub owner: Identity,
    /// Nice value requested at submission time (non-negative)
    pub nice: i32,
}

impl ControlRecord {
    pub fn new(file_name: impl Into<String>, owner: Identity, nice: i32) -> Self {
        Self {
            file_name: file_name.into(),
            owner,
            nice: nice.max(0),
        }
    }

    /// Renders the record in spool format
    pub fn render(&self) -> String {
        format!(
            "J: {}\nU: {}\nG: {}\nN: {}\n",
            self.file_name, self.owner.uid, self.owner.gid, self.nice
        )
    }

    /// Parses a record written by [`ControlRecord::render`]
    ///
    /// Lines are keyed by their first character; unknown lines are ignored.
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let mut file_name = None;
        let mut uid = None;
        let mut gid = None;
        let mut nice = None;

        for line in text.lines() {
            let Some(key) = line.chars().next() else {
                continue;
            };
            let value = field_value(line);
            match key {
                'J' => file_name = Some(value.to_string()),
                'U' => uid = Some(parse_field::<u32>('U', value)?),
                'G' => gid = Some(parse_field::<u32>('G', value)?),
                'N' => nice = Some(parse_field::<i32>('N', value)?),
                _ => {}
            }
        }

        Ok(Self {
            file_name: file_name.ok_or(RecordError::MissingField('J'))?,
            owner: Identity {
                uid: uid.ok_or(RecordError::MissingField('U'))?,
                gid: gid.ok_or(RecordError::MissingField('G'))?,
            },
            nice: nice.ok_or(RecordError::MissingField('N'))?,
        })
    }

    /// Internal scheduling priority for this job on a worker
    ///
    /// Priorities are stored negated relative to the nice value: the
    /// requested nice is clamped to be non-negative and negated, then capped
    /// at `-max_nice` so no job runs at a better priority than the worker
    /// allows. The value handed to `nice(1)` is the negation of the result.
    pub fn run_priority(&self, max_nice: i32) -> i32 {
        let priority = -self.nice.max(0);
        priority.min(-max_nice.max(0))
    }
}

/// Returns the text after the `X:` prefix of a record line
pub(crate) fn field_value(line: &str) -> &str {
    match line.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => line.get(1..).unwrap_or("").trim(),
    }
}

pub(crate) fn parse_field<T: FromStr>(field: char, value: &str) -> Result<T, RecordError> {
    value.parse::<T>().map_err(|_| RecordError::InvalidValue {
        field,
        value: value.to_string(),
    })
}
