//! Lock-service wire protocol
//!
//! Plain text over TCP, one exchange per connection. Every message is
//! terminated by a literal period:
//!
//! | Request               | Replies                                  |
//! |-----------------------|------------------------------------------|
//! | `STATUS.`             | `UNLOCKED.` or `LOCKED <host> <id>.`     |
//! | `GETLOCK <id>.`       | `OK.`, `DENIED.`, `ERROR.`               |
//! | `RELEASELOCK <id>.`   | `OK.`, `DENIED.`, `ERROR.`               |
//!
//! Unknown commands get no reply at all.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::domain::lock::{Holder, LockStatus};
use crate::error::ProtocolError;

/// Longest message accepted before the terminating period
pub const MAX_FRAME: usize = 160;

/// Message terminator
pub const TERMINATOR: u8 = b'.';

/// A command sent to the lock service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Status,
    GetLock { id: u32 },
    ReleaseLock { id: u32 },
}

impl Request {
    /// Parses a command with its terminator already stripped
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default();

        match verb {
            "STATUS" => Ok(Request::Status),
            "GETLOCK" => Ok(Request::GetLock {
                id: parse_id(line, parts.next())?,
            }),
            "RELEASELOCK" => Ok(Request::ReleaseLock {
                id: parse_id(line, parts.next())?,
            }),
            _ => Err(ProtocolError::UnknownCommand(line.to_string())),
        }
    }

    /// Wire form, terminator and trailing newline included
    pub fn encode(&self) -> String {
        match self {
            Request::Status => "STATUS.\n".to_string(),
            Request::GetLock { id } => format!("GETLOCK {}.\n", id),
            Request::ReleaseLock { id } => format!("RELEASELOCK {}.\n", id),
        }
    }
}

fn parse_id(line: &str, token: Option<&str>) -> Result<u32, ProtocolError> {
    token
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or_else(|| ProtocolError::MalformedId(line.to_string()))
}

/// A reply from the lock service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Denied,
    Error,
    Status(LockStatus),
}

impl Reply {
    /// Parses a reply with its terminator already stripped
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        match line {
            "OK" => return Ok(Reply::Ok),
            "DENIED" => return Ok(Reply::Denied),
            "ERROR" => return Ok(Reply::Error),
            "UNLOCKED" => return Ok(Reply::Status(LockStatus::Unlocked)),
            _ => {}
        }

        let mut parts = line.split_whitespace();
        if parts.next() == Some("LOCKED") {
            let host = parts.next();
            let id = parts.next().and_then(|s| s.parse::<u32>().ok());
            if let (Some(host), Some(id)) = (host, id) {
                return Ok(Reply::Status(LockStatus::Locked(Holder::new(host, id))));
            }
        }

        Err(ProtocolError::UnknownReply(line.to_string()))
    }

    /// Wire form, terminator and trailing newline included
    pub fn encode(&self) -> String {
        match self {
            Reply::Ok => "OK.\n".to_string(),
            Reply::Denied => "DENIED.\n".to_string(),
            Reply::Error => "ERROR.\n".to_string(),
            Reply::Status(LockStatus::Unlocked) => "UNLOCKED.\n".to_string(),
            Reply::Status(LockStatus::Locked(holder)) => {
                format!("LOCKED {} {}.\n", holder.host, holder.id)
            }
        }
    }
}

/// Bytes the service keeps from a command; everything else is dropped
pub fn is_command_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b' '
}

/// Bytes the client keeps from a reply
pub fn is_reply_byte(byte: u8) -> bool {
    byte != 0 && byte != b'\n' && byte != b'\r'
}

/// Reads one period-terminated message
///
/// Bytes rejected by `accept` are skipped. Returns `Ok(None)` if the peer
/// closes the stream before sending a terminator.
pub async fn read_message<R>(
    reader: &mut R,
    accept: fn(u8) -> bool,
) -> Result<Option<String>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(32);

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if byte == TERMINATOR {
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }

        if accept(byte) {
            if buf.len() >= MAX_FRAME {
                return Err(ProtocolError::FrameTooLong(MAX_FRAME));
            }
            buf.push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        assert_eq!(Request::parse("STATUS").unwrap(), Request::Status);
        assert_eq!(
            Request::parse("GETLOCK 3").unwrap(),
            Request::GetLock { id: 3 }
        );
        assert_eq!(
            Request::parse("RELEASELOCK 0").unwrap(),
            Request::ReleaseLock { id: 0 }
        );
    }

    #[test]
    fn test_parse_malformed_id() {
        assert!(matches!(
            Request::parse("GETLOCK abc"),
            Err(ProtocolError::MalformedId(_))
        ));
        assert!(matches!(
            Request::parse("RELEASELOCK"),
            Err(ProtocolError::MalformedId(_))
        ));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(
            Request::parse("HELLO 1"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_parse_status_replies() {
        assert_eq!(
            Reply::parse("UNLOCKED").unwrap(),
            Reply::Status(LockStatus::Unlocked)
        );
        assert_eq!(
            Reply::parse("LOCKED node01 2").unwrap(),
            Reply::Status(LockStatus::Locked(Holder::new("node01", 2)))
        );
        assert!(Reply::parse("LOCKED node01").is_err());
        assert!(Reply::parse("MAYBE").is_err());
    }

    #[tokio::test]
    async fn test_read_message_filters_bytes() {
        let mut input: &[u8] = b"GET\x01LOCK 7.\n\0";
        let msg = read_message(&mut input, is_command_byte).await.unwrap();
        assert_eq!(msg.as_deref(), Some("GETLOCK 7"));
    }

    #[tokio::test]
    async fn test_read_message_eof_without_terminator() {
        let mut input: &[u8] = b"GETLOCK 7";
        let msg = read_message(&mut input, is_command_byte).await.unwrap();
        assert!(msg.is_none());
    }

    #[tokio::test]
    async fn test_read_message_rejects_oversized_frame() {
        let long = vec![b'A'; MAX_FRAME + 10];
        let mut input: &[u8] = &long;
        let err = read_message(&mut input, is_command_byte).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong(_)));
    }
}
