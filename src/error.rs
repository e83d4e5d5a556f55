//! Unified error model for the loader, refresher and HTTP layer.
//!
//! Only `UnknownHost` is ever surfaced to a client; every other condition
//! is handled where it occurs (logged, counted, served as an empty or
//! partial listing). See `directory::Directory::resolve` for the rules.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Requested hostname has no entry in the servers table.
    #[error("no entry for hostname '{host}'")]
    UnknownHost { host: String },

    /// A `@group` reference named a user group that does not exist.
    #[error("no user group named '{group}'")]
    UnknownGroup { group: String },

    /// A remote key source could not be fetched. The previous cached
    /// value stays in place.
    #[error("could not fetch '{url}': {reason}")]
    RemoteFetch { url: String, reason: String },

    /// A hostname is declared both as a direct server and as a server
    /// group member. Fatal at load time.
    #[error("server '{host}' already exists, but is also member of servergroup '{group}'")]
    HostCollision { host: String, group: String },

    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Error {
    /// Map to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::UnknownHost { .. } => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
