//! QLite lock client
//!
//! Talks to the lock service that serialises every change to a cluster's
//! queue. Each call opens its own connection and sends a single command;
//! there is no session, so a client that dies while holding the lock leaves
//! it held until the service restarts.
//!
//! # Example
//!
//! ```no_run
//! use qlite_client::{LockClient, QueueLock};
//! use qlite_core::config::{LOCK_TIMEOUT, LockEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LockClient::connect(&LockEndpoint::new("lockhost", 5468)).await?;
//!
//!     client.acquire(0, LOCK_TIMEOUT).await?;
//!     // ... change the queue ...
//!     client.release(0).await?;
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{LockError, Result};

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use qlite_core::config::{LOCK_RETRY_INTERVAL, LockEndpoint};
use qlite_core::domain::lock::LockStatus;
use qlite_core::protocol::{self, Reply, Request};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Bound on connecting and on waiting for a reply
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Mutual exclusion over a cluster's queue
///
/// Implemented by [`LockClient`]; submission and the worker loop only
/// depend on this trait so they can be driven without a lock service.
#[async_trait]
pub trait QueueLock: Send + Sync {
    /// Takes the lock for `id`, retrying while it is held elsewhere
    async fn acquire(&self, id: u32, timeout: Duration) -> Result<()>;

    /// Gives the lock back
    async fn release(&self, id: u32) -> Result<()>;
}

/// TCP client for the lock service
#[derive(Debug, Clone)]
pub struct LockClient {
    addrs: Vec<SocketAddr>,
    retry_interval: Duration,
    io_timeout: Duration,
}

impl LockClient {
    /// Create a client for already-resolved addresses
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self {
            addrs,
            retry_interval: LOCK_RETRY_INTERVAL,
            io_timeout: IO_TIMEOUT,
        }
    }

    /// Resolve `endpoint` and create a client for it
    pub async fn connect(endpoint: &LockEndpoint) -> Result<Self> {
        Ok(Self::new(endpoint.socket_addrs().await?))
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Ask who holds the lock
    pub async fn status(&self) -> Result<LockStatus> {
        match self.exchange(Request::Status).await? {
            Some(Reply::Status(status)) => Ok(status),
            Some(other) => Err(LockError::UnexpectedReply(other.encode().trim().to_string())),
            None => Err(LockError::NoReply),
        }
    }

    /// Send one command on a fresh connection and read the reply
    ///
    /// Returns `None` if the service closes the connection without
    /// answering, which is what it does for hosts it does not know.
    async fn exchange(&self, request: Request) -> Result<Option<Reply>> {
        let mut stream = tokio::time::timeout(self.io_timeout, TcpStream::connect(&self.addrs[..]))
            .await
            .map_err(|_| LockError::connect(&self.addrs, timed_out()))?
            .map_err(|e| LockError::connect(&self.addrs, e))?;

        stream.write_all(request.encode().as_bytes()).await?;

        let message = tokio::time::timeout(
            self.io_timeout,
            protocol::read_message(&mut stream, protocol::is_reply_byte),
        )
        .await
        .map_err(|_| LockError::Io(timed_out()))??;

        let _ = stream.shutdown().await;

        match message {
            Some(line) => {
                debug!("{:?} -> {}", request, line);
                Ok(Some(Reply::parse(&line)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueueLock for LockClient {
    async fn acquire(&self, id: u32, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        loop {
            match self.exchange(Request::GetLock { id }).await? {
                Some(Reply::Ok) => return Ok(()),
                Some(Reply::Error) => return Err(LockError::Rejected),
                Some(Reply::Denied) | None => {}
                Some(other) => {
                    return Err(LockError::UnexpectedReply(other.encode().trim().to_string()));
                }
            }

            if start.elapsed() > timeout {
                return Err(LockError::TimedOut(timeout));
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn release(&self, id: u32) -> Result<()> {
        match self.exchange(Request::ReleaseLock { id }).await? {
            Some(Reply::Ok) => Ok(()),
            Some(Reply::Denied) => Err(LockError::Denied),
            Some(Reply::Error) => Err(LockError::Rejected),
            Some(other) => Err(LockError::UnexpectedReply(other.encode().trim().to_string())),
            None => Err(LockError::NoReply),
        }
    }
}

fn timed_out() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "lock service did not respond")
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlite_core::domain::lock::Holder;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves canned replies, one per connection, and counts connections
    async fn scripted_service(replies: Vec<&'static str>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        tokio::spawn(async move {
            let mut replies = replies.into_iter().cycle();
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);

                let mut buf = [0u8; 64];
                let _ = stream.read(&mut buf).await;
                let reply = replies.next().unwrap();
                if !reply.is_empty() {
                    stream.write_all(reply.as_bytes()).await.unwrap();
                }
            }
        });

        (addr, seen)
    }

    fn client(addr: SocketAddr) -> LockClient {
        LockClient::new(vec![addr])
            .with_retry_interval(Duration::from_millis(10))
            .with_io_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_acquire_retries_until_granted() {
        let (addr, seen) = scripted_service(vec!["DENIED.", "DENIED.", "OK."]).await;

        client(addr).acquire(1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let (addr, seen) = scripted_service(vec!["DENIED."]).await;

        let err = client(addr)
            .acquire(1, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(seen.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_acquire_error_reply_is_fatal() {
        let (addr, seen) = scripted_service(vec!["ERROR."]).await;

        let err = client(addr).acquire(1, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LockError::Rejected));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_without_service_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr).acquire(1, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LockError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_release_replies() {
        let (addr, _) = scripted_service(vec!["OK.", "DENIED.", ""]).await;
        let client = client(addr);

        client.release(1).await.unwrap();
        assert!(matches!(client.release(1).await, Err(LockError::Denied)));
        assert!(matches!(client.release(1).await, Err(LockError::NoReply)));
    }

    #[tokio::test]
    async fn test_status() {
        let (addr, _) = scripted_service(vec!["LOCKED node01 3.", "UNLOCKED."]).await;
        let client = client(addr);

        assert_eq!(
            client.status().await.unwrap(),
            LockStatus::Locked(Holder::new("node01", 3))
        );
        assert_eq!(client.status().await.unwrap(), LockStatus::Unlocked);
    }
}
