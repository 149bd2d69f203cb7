//! QLite Core
//!
//! Core types and abstractions for the QLite job queue.
//!
//! This crate contains:
//! - Domain types: jobs, control records, lock state, roster entries,
//!   running-status records
//! - Spool: the shared spool directory, its flag files and the queue
//!   invariants (job numbering, claiming)
//! - Protocol: the period-terminated text protocol spoken with the lock service
//! - Report: read-only fleet introspection over spool directories
//! - Config: lock-endpoint resolution shared by every binary

pub mod config;
pub mod domain;
pub mod error;
pub mod host;
pub mod protocol;
pub mod report;
pub mod spool;

pub use error::{ConfigError, ProtocolError, SpoolError};
