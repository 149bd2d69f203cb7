//! Service layer
//!
//! Services contain the side effects of running a job: starting the
//! process under supervision and notifying its owner. Both are trait-based
//! so the scheduler can be tested without spawning anything.

mod execution;
mod notification;

// Re-export traits
pub use execution::ExecutionService;
pub use notification::Notifier;

// Re-export implementations
pub use execution::ProcessExecutionService;
pub use notification::{DEFAULT_SENDMAIL, SendmailNotifier};
