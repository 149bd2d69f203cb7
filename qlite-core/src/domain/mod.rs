//! Core domain types
//!
//! This module contains the core domain structures used across QLite
//! components. The submitter and the worker share the job and control-file
//! types, the lock service and its clients share the lock types, and the
//! reporter reads roster and running-status records written by workers.

pub mod job;
pub mod lock;
pub mod roster;
pub mod running;
