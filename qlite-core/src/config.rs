//! Shared configuration
//!
//! Timing constants used by every component, and resolution of the lock
//! service endpoint. The port is taken from, in order: the command line,
//! the spool's `.qllockdaemon` file, a `qlite/tcp` entry in `/etc/services`,
//! and finally [`DEFAULT_LOCK_PORT`].

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::spool::Spool;

/// Port used when nothing else names one
pub const DEFAULT_LOCK_PORT: u16 = 5468;

/// Service name looked up in the services database
pub const SERVICE_NAME: &str = "qlite";

pub const SERVICES_FILE: &str = "/etc/services";

/// How long submitters and workers keep retrying a denied lock
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between lock attempts
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Worker sleep when idle, suspended or unable to lock
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Worker pause after each executed job
pub const POST_JOB_PAUSE: Duration = Duration::from_secs(1);

/// Where the lock service listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEndpoint {
    pub host: String,
    pub port: u16,
}

impl LockEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolves the endpoint from command-line overrides and the spool
    pub fn resolve(
        cli_host: Option<&str>,
        cli_port: Option<u16>,
        spool: &Spool,
    ) -> Result<Self, ConfigError> {
        let from_file = spool.read_lock_daemon()?;
        let (file_host, file_port) = match from_file {
            Some((host, port)) => (Some(host), port),
            None => (None, None),
        };

        let host = cli_host
            .map(str::to_string)
            .or(file_host)
            .ok_or_else(|| ConfigError::MissingLockHost(spool.root().to_path_buf()))?;

        let port = match cli_port.or(file_port) {
            Some(port) => checked_port(port)?,
            None => service_port(Path::new(SERVICES_FILE)),
        };

        debug!("Lock service endpoint {}:{}", host, port);
        Ok(Self { host, port })
    }

    /// Resolves the hostname, failing if it has no addresses
    pub async fn socket_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let unresolved = |source| ConfigError::UnresolvedLockHost {
            host: self.host.clone(),
            source,
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(unresolved)?
            .collect();

        if addrs.is_empty() {
            return Err(unresolved(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses",
            )));
        }
        Ok(addrs)
    }
}

impl fmt::Display for LockEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Port the lock service listens on when none is given explicitly
pub fn lockd_port(cli_port: Option<u16>) -> Result<u16, ConfigError> {
    match cli_port {
        Some(port) => checked_port(port),
        None => Ok(service_port(Path::new(SERVICES_FILE))),
    }
}

fn checked_port(port: u16) -> Result<u16, ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port.to_string()));
    }
    Ok(port)
}

/// Port from the services database, or the default
fn service_port(services: &Path) -> u16 {
    std::fs::read_to_string(services)
        .ok()
        .and_then(|text| parse_services(&text, SERVICE_NAME))
        .unwrap_or(DEFAULT_LOCK_PORT)
}

/// Finds the TCP port for `name` in services(5) format
///
/// Matches the service name or any of its aliases.
pub fn parse_services(text: &str, name: &str) -> Option<u16> {
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();

        let (Some(service), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        if service == name || fields.any(|alias| alias == name) {
            if let Ok(port) = port.parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_services() {
        let text = "\
# Network services
ssh      22/tcp
qlite    6001/udp
qlite    6000/tcp   qlock   # cluster lock
";
        assert_eq!(parse_services(text, "qlite"), Some(6000));
        assert_eq!(parse_services(text, "qlock"), Some(6000));
        assert_eq!(parse_services(text, "ssh"), Some(22));
        assert_eq!(parse_services(text, "nntp"), None);
    }

    #[test]
    fn test_resolve_prefers_command_line() {
        let dir = TempDir::new().unwrap();
        let spool = Spool::new(dir.path());
        std::fs::write(spool.lock_daemon_path(), "filehost 6000\n").unwrap();

        let endpoint = LockEndpoint::resolve(Some("clihost"), Some(7000), &spool).unwrap();
        assert_eq!(endpoint, LockEndpoint::new("clihost", 7000));

        let endpoint = LockEndpoint::resolve(None, None, &spool).unwrap();
        assert_eq!(endpoint, LockEndpoint::new("filehost", 6000));

        let endpoint = LockEndpoint::resolve(Some("clihost"), None, &spool).unwrap();
        assert_eq!(endpoint, LockEndpoint::new("clihost", 6000));
    }

    #[test]
    fn test_resolve_without_host_fails() {
        let dir = TempDir::new().unwrap();
        let spool = Spool::new(dir.path());

        let err = LockEndpoint::resolve(None, Some(7000), &spool).unwrap_err();
        assert!(matches!(err, ConfigError::MissingLockHost(_)));
    }

    #[test]
    fn test_zero_port_rejected() {
        assert!(matches!(lockd_port(Some(0)), Err(ConfigError::InvalidPort(_))));
        assert_eq!(lockd_port(Some(6000)).unwrap(), 6000);
    }

    #[test]
    fn test_service_port_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(service_port(&dir.path().join("services")), DEFAULT_LOCK_PORT);
    }

    #[tokio::test]
    async fn test_socket_addrs_for_localhost() {
        let endpoint = LockEndpoint::new("127.0.0.1", 6000);
        let addrs = endpoint.socket_addrs().await.unwrap();
        assert_eq!(addrs[0].port(), 6000);
    }
}
