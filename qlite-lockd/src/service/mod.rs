//! Service Module
//!
//! Lock state and the rules applied to each request.

pub mod lock;

pub use lock::LockService;
