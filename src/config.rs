//! Declarative TOML configuration: who exists, which hosts they may reach,
//! and through which account mappings. Parsing is a discrete phase; the
//! result is handed to `directory::Directory::from_config`, which performs
//! structural validation before anything is served.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Top-level config file shape. All tables are optional; an empty file is
/// a valid (if useless) directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub users: HashMap<String, UserConfig>,
    #[serde(default)]
    pub servers: HashMap<String, PolicyConfig>,
    #[serde(default, rename = "usergroups")]
    pub user_groups: HashMap<String, UserGroupConfig>,
    #[serde(default, rename = "servergroups")]
    pub server_groups: HashMap<String, ServerGroupConfig>,
}

/// One declared user: an ordered list of key entries, each either literal
/// key text or an http(s) URL to fetch key text from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Named set of usernames. Members must be concrete usernames; groups do
/// not nest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserGroupConfig {
    #[serde(default)]
    pub members: Vec<String>,
}

/// Account-mapping policy for one server (or one server group): local
/// account name to the user/group references allowed to log in as it,
/// plus the self-mapping fallback flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub users: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub mapusers: bool,
}

/// A list of member hostnames sharing one account-mapping policy. Folded
/// into the servers table at load time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerGroupConfig {
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(flatten)]
    pub policy: PolicyConfig,
}

impl Config {
    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)?;
        let conf: Config = toml::from_str(&raw)?;
        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[users.alice]
keys = [
    "ssh-ed25519 AAAAC3Nza alice@laptop",
    "https://git.example.com/alice.keys",
]

[users.bob]
keys = ["ssh-rsa AAAAB3Nza bob@desk"]

[usergroups.admins]
members = ["alice", "bob"]

[servers."web1.example.com"]
mapusers = true

[servers."web1.example.com".users]
deploy = ["@admins", "carol"]

[servergroups.fleet]
members = ["db1.example.com", "db2.example.com"]

[servergroups.fleet.users]
postgres = ["@admins"]
"#;

    #[test]
    fn parses_full_sample() {
        let conf: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(conf.users.len(), 2);
        assert_eq!(conf.users["alice"].keys.len(), 2);
        assert_eq!(conf.user_groups["admins"].members, vec!["alice", "bob"]);

        let web1 = &conf.servers["web1.example.com"];
        assert!(web1.mapusers);
        assert_eq!(web1.users["deploy"], vec!["@admins", "carol"]);

        let fleet = &conf.server_groups["fleet"];
        assert_eq!(fleet.members, vec!["db1.example.com", "db2.example.com"]);
        assert!(!fleet.policy.mapusers);
        assert_eq!(fleet.policy.users["postgres"], vec!["@admins"]);
    }

    #[test]
    fn empty_file_yields_empty_tables() {
        let conf: Config = toml::from_str("").unwrap();
        assert!(conf.users.is_empty());
        assert!(conf.servers.is_empty());
        assert!(conf.user_groups.is_empty());
        assert!(conf.server_groups.is_empty());
    }

    #[test]
    fn mapusers_defaults_to_false() {
        let conf: Config = toml::from_str("[servers.\"h1\"]\n").unwrap();
        let h1 = &conf.servers["h1"];
        assert!(!h1.mapusers);
        assert!(h1.users.is_empty());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let conf = Config::load(f.path()).unwrap();
        assert_eq!(conf.users.len(), 2);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("could not read config"));
    }

    #[test]
    fn load_bad_toml_errors() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"[users\n").unwrap();
        let err = Config::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("could not parse config"));
    }
}
