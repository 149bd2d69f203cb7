//! Connection admission
//!
//! Only hosts named in the machine roster may talk to the lock service.
//! Peers are identified by reverse-resolving their address and keeping the
//! short hostname.

use std::collections::HashSet;
#[cfg(test)]
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use qlite_core::domain::roster::RosterEntry;
use qlite_core::host;

/// Turns a peer address into a hostname
#[async_trait]
pub trait PeerResolver: Send + Sync {
    async fn resolve(&self, addr: IpAddr) -> io::Result<String>;
}

/// Reverse DNS through the system resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait]
impl PeerResolver for DnsResolver {
    async fn resolve(&self, addr: IpAddr) -> io::Result<String> {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .map_err(io::Error::other)?
    }
}

/// Fixed address-to-name table
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    names: HashMap<IpAddr, String>,
}

#[cfg(test)]
impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, addr: IpAddr, name: impl Into<String>) -> Self {
        self.names.insert(addr, name.into());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl PeerResolver for StaticResolver {
    async fn resolve(&self, addr: IpAddr) -> io::Result<String> {
        self.names
            .get(&addr)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no name for {}", addr)))
    }
}

/// Decides which peers are served
pub struct Admission {
    allowed: HashSet<String>,
    resolver: Box<dyn PeerResolver>,
}

impl Admission {
    pub fn new(roster: &[RosterEntry], resolver: Box<dyn PeerResolver>) -> Self {
        Self {
            allowed: roster.iter().map(|entry| entry.host.clone()).collect(),
            resolver,
        }
    }

    /// Short hostname of an admitted peer, `None` if it must be dropped
    pub async fn admit(&self, addr: IpAddr) -> Option<String> {
        let name = match self.resolver.resolve(addr).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Cannot resolve peer {}: {}", addr, e);
                return None;
            }
        };

        let short = host::short_name(&name).to_string();
        if self.allowed.contains(&short) {
            Some(short)
        } else {
            tracing::warn!("Dropping connection from {} ({}), not in roster", short, addr);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn node(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn admission() -> Admission {
        let roster = vec![RosterEntry::new("node01", 1), RosterEntry::new("node01", 2)];
        let resolver = StaticResolver::new()
            .with_host(node(1), "node01.cluster.example.org")
            .with_host(node(2), "intruder.example.org");
        Admission::new(&roster, Box::new(resolver))
    }

    #[tokio::test]
    async fn test_admits_roster_host_by_short_name() {
        assert_eq!(admission().admit(node(1)).await.as_deref(), Some("node01"));
    }

    #[tokio::test]
    async fn test_drops_unknown_host() {
        assert_eq!(admission().admit(node(2)).await, None);
    }

    #[tokio::test]
    async fn test_drops_unresolvable_peer() {
        assert_eq!(admission().admit(node(3)).await, None);
    }
}
