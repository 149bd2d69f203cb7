//! Host and account lookups
//!
//! Hosts are always compared by their short name (everything before the
//! first dot), both in the roster and in per-host flag file names.

use std::io;
use std::path::PathBuf;

use nix::unistd::{Gid, Group, Uid, User};

use crate::domain::job::Identity;

/// Strips the domain suffix from a hostname
pub fn short_name(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

/// Short hostname of this machine
pub fn local_short_hostname() -> io::Result<String> {
    let name = nix::unistd::gethostname()?;
    let name = name
        .into_string()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not UTF-8"))?;
    Ok(short_name(&name).to_string())
}

/// True when the effective user is the superuser
pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Real uid of the calling process
///
/// `ql` may be installed setuid root, so only the real uid tells who
/// invoked it.
pub fn real_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

/// A password-database entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub home: PathBuf,
    pub identity: Identity,
}

/// Looks up the account for a uid
pub fn account_for_uid(uid: u32) -> Option<Account> {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => Some(Account {
            name: user.name,
            home: user.dir,
            identity: Identity::new(user.uid.as_raw(), user.gid.as_raw()),
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Password lookup for uid {} failed: {}", uid, e);
            None
        }
    }
}

/// Login name for a uid, if it has one
pub fn user_name(uid: u32) -> Option<String> {
    account_for_uid(uid).map(|account| account.name)
}

/// Group name for a gid, if it has one
pub fn group_name(gid: u32) -> Option<String> {
    Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|group| group.name)
}

/// `user:group`, falling back to the numeric ids for unknown accounts
pub fn owner_label(owner: &Identity) -> String {
    let user = user_name(owner.uid).unwrap_or_else(|| owner.uid.to_string());
    let group = group_name(owner.gid).unwrap_or_else(|| owner.gid.to_string());
    format!("{}:{}", user, group)
}
