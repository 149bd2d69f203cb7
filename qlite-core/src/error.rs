//! Error types shared by QLite components

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::job::{Identity, JobId};

/// Errors raised while reading or mutating a spool directory
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The spool directory (or cluster subdirectory) is missing
    #[error("spool directory {0} does not exist")]
    MissingSpool(PathBuf),

    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record file could not be parsed
    #[error("malformed {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: RecordError,
    },

    /// A control file is not owned by the privileged account
    #[error("control file {0} is not owned by the privileged account")]
    UntrustedControlFile(PathBuf),

    /// A file written into the spool could not be handed to its owner
    #[error("cannot give {path} to {owner}: {source}")]
    Ownership {
        path: PathBuf,
        owner: Identity,
        #[source]
        source: io::Error,
    },

    /// A job declares the privileged account as its owner
    #[error("job {0} declares a privileged owner")]
    PrivilegedOwner(JobId),
}

impl SpoolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SpoolError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, source: RecordError) -> Self {
        SpoolError::Malformed {
            path: path.into(),
            source,
        }
    }

    /// Check if the underlying cause is a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpoolError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Errors in the line-oriented record files (control, running, roster)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing field '{0}'")]
    MissingField(char),

    #[error("invalid value for field '{field}': {value:?}")]
    InvalidValue { field: char, value: String },

    #[error("line {line}: expected '<hostname> <instance>', got {text:?}")]
    BadRosterLine { line: usize, text: String },
}

/// Errors resolving the configuration handed to the core
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no lock host given: use --lock-host or the .qllockdaemon file in {0}")]
    MissingLockHost(PathBuf),

    #[error("cannot resolve lock host {host}: {source}")]
    UnresolvedLockHost {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error(transparent)]
    Spool(#[from] SpoolError),
}

/// Errors in the lock-service wire protocol
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("malformed lock id in command: {0:?}")]
    MalformedId(String),

    #[error("unrecognised reply: {0:?}")]
    UnknownReply(String),

    #[error("message exceeds {0} bytes without a terminator")]
    FrameTooLong(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}
