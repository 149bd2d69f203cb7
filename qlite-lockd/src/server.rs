//! Lock server
//!
//! Connections are served strictly one at a time: accept, admit, read one
//! command, reply, drain, close. Every read is bounded so a stalled peer
//! cannot hold up the rest of the cluster for long.

use std::net::SocketAddr;
use std::time::Duration;

use qlite_core::protocol::{self, Reply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::admission::Admission;
use crate::service::LockService;

/// Bound on the whole of a peer's drain after the reply
const DRAIN_LIMIT: usize = 4096;

pub struct LockServer {
    listener: TcpListener,
    admission: Admission,
    service: LockService,
    io_timeout: Duration,
}

impl LockServer {
    pub fn new(listener: TcpListener, admission: Admission, io_timeout: Duration) -> Self {
        Self {
            listener,
            admission,
            service: LockService::new(),
            io_timeout,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Lock service ready, state {}", self.service.state());

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.serve(stream, peer).await,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            }
        }

        tracing::info!("Lock service stopping, state {}", self.service.state());
    }

    async fn serve(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        let Some(host) = self.admission.admit(peer.ip()).await else {
            return;
        };

        let line = match tokio::time::timeout(
            self.io_timeout,
            protocol::read_message(&mut stream, protocol::is_command_byte),
        )
        .await
        {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                tracing::debug!("{} closed the connection without a command", host);
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!("Bad command from {}: {}", host, e);
                return;
            }
            Err(_) => {
                tracing::warn!("Timed out waiting for a command from {}", host);
                return;
            }
        };

        tracing::debug!("Command from {}: {}", host, line);

        if let Some(reply) = self.service.handle_line(&line, &host) {
            if let Err(e) = self.reply(&mut stream, &reply).await {
                tracing::warn!("Cannot reply to {}: {}", host, e);
                return;
            }
        }

        self.drain(&mut stream).await;
    }

    async fn reply(&self, stream: &mut TcpStream, reply: &Reply) -> std::io::Result<()> {
        tokio::time::timeout(self.io_timeout, stream.write_all(reply.encode().as_bytes()))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))?
    }

    /// Reads whatever the peer still sends until it closes, within limits
    async fn drain(&self, stream: &mut TcpStream) {
        let mut buf = [0u8; 256];
        let mut total = 0;

        let drained = tokio::time::timeout(self.io_timeout, async {
            while total < DRAIN_LIMIT {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => total += n,
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::debug!("Gave up draining connection after {:?}", self.io_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::StaticResolver;
    use qlite_client::{LockClient, LockError, QueueLock};
    use qlite_core::domain::lock::{Holder, LockStatus};
    use qlite_core::domain::roster::RosterEntry;
    use std::net::{IpAddr, Ipv4Addr};

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn start(resolver: StaticResolver) -> (SocketAddr, LockClient, CancellationToken) {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let roster = vec![RosterEntry::new("node01", 1)];
        let server = LockServer::new(
            listener,
            Admission::new(&roster, Box::new(resolver)),
            Duration::from_secs(2),
        );
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));

        let client = LockClient::new(vec![addr])
            .with_retry_interval(Duration::from_millis(10))
            .with_io_timeout(Duration::from_secs(2));
        (addr, client, shutdown)
    }

    fn known() -> StaticResolver {
        StaticResolver::new().with_host(LOOPBACK, "node01.example.org")
    }

    #[tokio::test]
    async fn test_lock_round_trip_over_tcp() {
        let (_, client, shutdown) = start(known()).await;

        assert_eq!(client.status().await.unwrap(), LockStatus::Unlocked);

        client.acquire(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            client.status().await.unwrap(),
            LockStatus::Locked(Holder::new("node01", 1))
        );

        client.release(1).await.unwrap();
        assert_eq!(client.status().await.unwrap(), LockStatus::Unlocked);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_held_lock_denies_others_until_released() {
        let (_, client, shutdown) = start(known()).await;

        client.acquire(1, Duration::from_secs(1)).await.unwrap();

        let err = client.acquire(2, Duration::from_millis(100)).await.unwrap_err();
        assert!(err.is_timeout());

        assert!(matches!(client.release(2).await, Err(LockError::Denied)));
        client.release(1).await.unwrap();
        client.acquire(2, Duration::from_secs(1)).await.unwrap();

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_release_while_unlocked_is_rejected() {
        let (_, client, shutdown) = start(known()).await;
        assert!(matches!(client.release(1).await, Err(LockError::Rejected)));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unknown_command_gets_no_reply() {
        let (addr, client, shutdown) = start(known()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"HELLO 1.\n").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        // The service is still there afterwards
        assert_eq!(client.status().await.unwrap(), LockStatus::Unlocked);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_command_bytes_are_filtered() {
        let (addr, client, shutdown) = start(known()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET-LOCK\t 7.\0").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "OK.\n");

        assert_eq!(
            client.status().await.unwrap(),
            LockStatus::Locked(Holder::new("node01", 7))
        );
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unlisted_host_is_dropped() {
        let (_, client, shutdown) = start(StaticResolver::new()).await;

        // Closed without a reply, possibly with a reset
        let err = client.release(1).await.unwrap_err();
        assert!(matches!(
            err,
            LockError::NoReply | LockError::Protocol(_) | LockError::Io(_)
        ));

        shutdown.cancel();
    }
}
