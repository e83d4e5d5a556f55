//!
//! keyward directory model
//! -----------------------
//! In-memory model of who may log in where: declared users with their key
//! entries, per-server account-mapping policies, and user groups. Built once
//! from `config::Config` and structurally frozen from then on; only the
//! resolved key text changes afterwards, when the refresher installs a new
//! users table.
//!
//! Key responsibilities:
//! - Fold server groups into the servers map at load, rejecting hostnames
//!   that appear both directly and through a group.
//! - Resolve a (hostname, account) pair to the key listing sshd should
//!   trust, applying explicit mappings, the `mapusers` fallback and group
//!   expansion.
//! - Hand out and accept whole-table snapshots so readers never observe a
//!   half-refreshed pass.
//!
//! Error policy follows the serving contract: only an unknown hostname is an
//! error. Every other irregularity (unmapped account, unknown group, a
//! resolved username missing from the users table) is logged and turns into
//! an empty or truncated listing, never a failed request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::config::{Config, PolicyConfig};
use crate::error::{Error, Result};

mod expand;
pub use expand::expand;


/// Where one key entry's text comes from. Classified once at load: anything
/// starting with `http` is fetched, everything else is used verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Literal(String),
    Remote(String),
}

/// One declared key entry and its cached text. `resolved` starts empty and
/// is only ever written by a refresh pass; serving skips empty values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub source: KeySource,
    pub resolved: String,
}

impl KeyEntry {
    fn new(text: String) -> KeyEntry {
        let source = if text.starts_with("http") {
            KeySource::Remote(text)
        } else {
            KeySource::Literal(text)
        };
        KeyEntry { source, resolved: String::new() }
    }
}

/// A declared user: an ordered sequence of key entries. The sequence never
/// grows or shrinks after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub entries: Vec<KeyEntry>,
}

impl User {
    fn new(keys: Vec<String>) -> User {
        User { entries: keys.into_iter().map(KeyEntry::new).collect() }
    }
}

/// Account-mapping policy for one host.
#[derive(Debug, Clone)]
pub struct AccountPolicy {
    /// Local account name to the user/group references allowed into it.
    pub accounts: HashMap<String, Vec<String>>,
    /// When set, a local account with no explicit mapping falls back to the
    /// identically-named declared user.
    pub mapusers: bool,
}

impl From<PolicyConfig> for AccountPolicy {
    fn from(conf: PolicyConfig) -> AccountPolicy {
        AccountPolicy { accounts: conf.users, mapusers: conf.mapusers }
    }
}

/// One user's slice of a resolved listing: the username and its non-empty
/// key lines, in declared entry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKeys {
    pub username: String,
    pub keys: Vec<String>,
}

/// The aggregate directory. Structure (servers, groups, which users exist
/// and how many entries each has) is immutable after `from_config`; the
/// users table itself is swapped wholesale by the refresher.
pub struct Directory {
    users: RwLock<Arc<HashMap<String, User>>>,
    servers: HashMap<String, AccountPolicy>,
    user_groups: HashMap<String, Vec<String>>,
}

impl Directory {
    /// Build the directory from parsed configuration. Folds every server
    /// group member into the servers map with a copy of the group's policy.
    /// A hostname declared both directly and via a group is fatal here,
    /// before anything is served.
    pub fn from_config(conf: Config) -> Result<Directory> {
        let users: HashMap<String, User> = conf
            .users
            .into_iter()
            .map(|(name, user)| (name, User::new(user.keys)))
            .collect();

        let mut servers: HashMap<String, AccountPolicy> = conf
            .servers
            .into_iter()
            .map(|(host, policy)| (host, AccountPolicy::from(policy)))
            .collect();
        for (groupname, group) in conf.server_groups {
            let policy = AccountPolicy::from(group.policy);
            for member in group.members {
                if servers.contains_key(&member) {
                    return Err(Error::HostCollision { host: member, group: groupname });
                }
                servers.insert(member, policy.clone());
            }
        }

        let user_groups = conf
            .user_groups
            .into_iter()
            .map(|(name, group)| (name, group.members))
            .collect();

        Ok(Directory {
            users: RwLock::new(Arc::new(users)),
            servers,
            user_groups,
        })
    }

    /// Resolve the key listing for a login attempt of `username` on
    /// `hostname`.
    ///
    /// Only an unknown hostname is an error. Once the host is known the
    /// request always succeeds: an empty listing is the deliberate answer
    /// for unmapped accounts and broken group references, so that callers
    /// polling this as their AuthorizedKeysCommand clear cached keys for
    /// accounts that were rotated out.
    pub fn resolve(&self, hostname: &str, username: &str) -> Result<Vec<UserKeys>> {
        let Some(policy) = self.servers.get(hostname) else {
            return Err(Error::UnknownHost { host: hostname.to_string() });
        };

        let table = self.snapshot();

        let refs: Vec<String> = match policy.accounts.get(username) {
            Some(refs) => refs.clone(),
            None if !policy.mapusers => {
                debug!(host = hostname, user = username, "no entry for user on server");
                return Ok(Vec::new());
            }
            None => {
                if !table.contains_key(username) {
                    debug!(host = hostname, user = username, "no entry for mapped user on server");
                    return Ok(Vec::new());
                }
                vec![username.to_string()]
            }
        };

        let usernames = match expand(&refs, &self.user_groups) {
            Ok(names) => names,
            Err(err) => {
                warn!(host = hostname, user = username, %err, "could not expand users");
                return Ok(Vec::new());
            }
        };

        let mut listing = Vec::with_capacity(usernames.len());
        for name in usernames {
            let Some(user) = table.get(&name) else {
                // A reference that expanded to an undeclared user means the
                // directory is inconsistent. The faulting username's header
                // still renders (with no keys); everything after it is cut.
                error!(user = %name, "resolved username missing from users table");
                listing.push(UserKeys { username: name, keys: Vec::new() });
                break;
            };
            let keys = user
                .entries
                .iter()
                .filter(|entry| !entry.resolved.is_empty())
                .map(|entry| entry.resolved.clone())
                .collect();
            listing.push(UserKeys { username: name, keys });
        }
        Ok(listing)
    }

    /// Current users table. Readers render from the returned snapshot with
    /// no lock held.
    pub(crate) fn snapshot(&self) -> Arc<HashMap<String, User>> {
        self.users.read().clone()
    }

    /// Install a fully refreshed users table. The swap is the only write
    /// the directory ever sees after load.
    pub(crate) fn install(&self, table: HashMap<String, User>) {
        *self.users.write() = Arc::new(table);
    }
}
