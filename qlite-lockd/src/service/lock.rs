//! Lock Service
//!
//! The single cluster-wide lock and the rules for taking and giving it back.
//! State lives only in memory; a restarted service starts out unlocked.

use qlite_core::ProtocolError;
use qlite_core::domain::lock::{Holder, LockStatus};
use qlite_core::protocol::{Reply, Request};

/// The lock and its current holder
#[derive(Debug, Default)]
pub struct LockService {
    state: LockStatus,
}

impl LockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LockStatus {
        &self.state
    }

    /// Handles one raw command line from `host`
    ///
    /// Returns `None` for commands the service does not know, which get no
    /// reply on the wire.
    pub fn handle_line(&mut self, line: &str, host: &str) -> Option<Reply> {
        match Request::parse(line) {
            Ok(request) => Some(self.handle(request, host)),
            Err(ProtocolError::MalformedId(_)) => {
                tracing::debug!("Malformed command from {}: {:?}", host, line);
                Some(Reply::Error)
            }
            Err(e) => {
                tracing::debug!("Ignoring command from {}: {}", host, e);
                None
            }
        }
    }

    pub fn handle(&mut self, request: Request, host: &str) -> Reply {
        match request {
            Request::Status => Reply::Status(self.state.clone()),
            Request::GetLock { id } => self.get_lock(host, id),
            Request::ReleaseLock { id } => self.release_lock(host, id),
        }
    }

    /// Grants the lock if nobody holds it
    ///
    /// Not reentrant: the current holder asking again is denied too.
    fn get_lock(&mut self, host: &str, id: u32) -> Reply {
        if let LockStatus::Locked(holder) = &self.state {
            tracing::debug!("Lock request from {}#{} denied, held by {}", host, id, holder);
            return Reply::Denied;
        }

        let holder = Holder::new(host, id);
        tracing::debug!("Lock granted to {}", holder);
        self.state = LockStatus::Locked(holder);
        Reply::Ok
    }

    /// Releases the lock, but only for the exact host and id holding it
    fn release_lock(&mut self, host: &str, id: u32) -> Reply {
        match &self.state {
            LockStatus::Unlocked => {
                tracing::debug!("Release from {}#{} while unlocked", host, id);
                Reply::Error
            }
            LockStatus::Locked(holder) if holder.host == host && holder.id == id => {
                tracing::debug!("Lock released by {}", holder);
                self.state = LockStatus::Unlocked;
                Reply::Ok
            }
            LockStatus::Locked(holder) => {
                tracing::debug!("Release from {}#{} denied, held by {}", host, id, holder);
                Reply::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_release() {
        let mut service = LockService::new();

        assert_eq!(service.handle(Request::GetLock { id: 1 }, "node01"), Reply::Ok);
        assert_eq!(
            service.state(),
            &LockStatus::Locked(Holder::new("node01", 1))
        );
        assert_eq!(
            service.handle(Request::ReleaseLock { id: 1 }, "node01"),
            Reply::Ok
        );
        assert_eq!(service.state(), &LockStatus::Unlocked);
    }

    #[test]
    fn test_second_requester_denied() {
        let mut service = LockService::new();

        assert_eq!(service.handle(Request::GetLock { id: 1 }, "node01"), Reply::Ok);
        assert_eq!(
            service.handle(Request::GetLock { id: 2 }, "node02"),
            Reply::Denied
        );
    }

    #[test]
    fn test_not_reentrant() {
        let mut service = LockService::new();

        assert_eq!(service.handle(Request::GetLock { id: 1 }, "node01"), Reply::Ok);
        assert_eq!(
            service.handle(Request::GetLock { id: 1 }, "node01"),
            Reply::Denied
        );
    }

    #[test]
    fn test_release_by_non_holder_keeps_lock() {
        let mut service = LockService::new();
        service.handle(Request::GetLock { id: 1 }, "node01");

        // Same host, wrong id
        assert_eq!(
            service.handle(Request::ReleaseLock { id: 2 }, "node01"),
            Reply::Denied
        );
        // Same id, wrong host
        assert_eq!(
            service.handle(Request::ReleaseLock { id: 1 }, "node02"),
            Reply::Denied
        );
        // A third party still cannot get in
        assert_eq!(
            service.handle(Request::GetLock { id: 3 }, "node03"),
            Reply::Denied
        );

        assert_eq!(
            service.handle(Request::ReleaseLock { id: 1 }, "node01"),
            Reply::Ok
        );
        assert_eq!(service.handle(Request::GetLock { id: 3 }, "node03"), Reply::Ok);
    }

    #[test]
    fn test_release_while_unlocked() {
        let mut service = LockService::new();
        assert_eq!(
            service.handle(Request::ReleaseLock { id: 1 }, "node01"),
            Reply::Error
        );
    }

    #[test]
    fn test_status_reports_holder() {
        let mut service = LockService::new();
        assert_eq!(
            service.handle(Request::Status, "node01"),
            Reply::Status(LockStatus::Unlocked)
        );

        service.handle(Request::GetLock { id: 4 }, "node02");
        assert_eq!(
            service.handle(Request::Status, "node01"),
            Reply::Status(LockStatus::Locked(Holder::new("node02", 4)))
        );
    }

    #[test]
    fn test_handle_line() {
        let mut service = LockService::new();

        assert_eq!(service.handle_line("HELLO", "node01"), None);
        assert_eq!(service.handle_line("GETLOCK x", "node01"), Some(Reply::Error));
        assert_eq!(service.handle_line("GETLOCK 5", "node01"), Some(Reply::Ok));
        assert_eq!(service.state(), &LockStatus::Locked(Holder::new("node01", 5)));
    }

    #[test]
    fn test_mutual_exclusion_over_many_requests() {
        let mut service = LockService::new();
        let hosts = ["node01", "node02", "node03"];
        let mut holder: Option<(&str, u32)> = None;

        for round in 0..30u32 {
            let host = hosts[(round % 3) as usize];
            let id = round % 4;
            match service.handle(Request::GetLock { id }, host) {
                Reply::Ok => {
                    assert!(holder.is_none(), "lock granted twice");
                    holder = Some((host, id));
                }
                Reply::Denied => assert!(holder.is_some()),
                other => panic!("unexpected reply {:?}", other),
            }

            if round % 2 == 1 {
                if let Some((h, i)) = holder.take() {
                    assert_eq!(service.handle(Request::ReleaseLock { id: i }, h), Reply::Ok);
                }
            }
        }
    }
}
