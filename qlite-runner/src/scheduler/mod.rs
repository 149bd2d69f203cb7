//! Scheduler layer for the runner
//!
//! Polls the shared spool, coordinates with the cluster lock, and hands
//! claimed jobs to the execution service one at a time.

pub mod poller;

pub use poller::{JobPoller, WorkerState};
