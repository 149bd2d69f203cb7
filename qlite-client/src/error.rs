//! Error types for the lock client

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use qlite_core::{ConfigError, ProtocolError};
use thiserror::Error;

/// Result type alias for lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors that can occur while talking to the lock service
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock endpoint could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No connection could be made
    #[error("cannot connect to lock service at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Reading or writing the connection failed or stalled
    #[error("lock service I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The lock stayed taken for longer than the caller was willing to wait
    #[error("timed out after {0:?} waiting for the lock")]
    TimedOut(Duration),

    /// The service answered `ERROR.`
    #[error("lock service rejected the request")]
    Rejected,

    /// The service answered `DENIED.` to a release
    #[error("lock is held by someone else")]
    Denied,

    /// The service closed the connection without answering
    #[error("lock service closed the connection without a reply")]
    NoReply,

    /// The service answered something that makes no sense for the request
    #[error("unexpected reply from lock service: {0}")]
    UnexpectedReply(String),
}

impl LockError {
    pub(crate) fn connect(addrs: &[SocketAddr], source: io::Error) -> Self {
        let addr = addrs
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<none>".to_string());
        Self::Connect { addr, source }
    }

    /// Check if the lock simply could not be obtained in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}
