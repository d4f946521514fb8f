//! Store configuration and option defaulting.
//!
//! # Invariants
//! - Missing keys fall back to the defaults below.
//! - Collection names are valid identifiers and differ from each other.

use crate::db::collection::is_valid_identifier;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Sentinel `database` value selecting an in-memory SQLite database.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

const DEFAULT_DATABASE: &str = "greenlock.sqlite3";
const DEFAULT_CERTS_COLLECTION: &str = "certificates";
const DEFAULT_ACCOUNTS_COLLECTION: &str = "accounts";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1000;

#[derive(Debug)]
pub enum ConfigError {
    InvalidJson(serde_json::Error),
    EmptyDatabase,
    InvalidCollectionName(String),
    DuplicateCollectionName(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(err) => write!(f, "invalid store options: {err}"),
            Self::EmptyDatabase => write!(f, "`database` cannot be empty"),
            Self::InvalidCollectionName(name) => write!(
                f,
                "collection name `{name}` must match [A-Za-z_][A-Za-z0-9_]*"
            ),
            Self::DuplicateCollectionName(name) => write!(
                f,
                "accounts and certificates cannot share collection `{name}`"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidJson(err) => Some(err),
            _ => None,
        }
    }
}

/// Options for opening a record store.
///
/// Keys are camelCase when loaded from JSON, e.g.
/// `{"database": "/var/lib/acme/store.sqlite3", "certsCollName": "certs"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// SQLite file path, or `:memory:`.
    pub database: String,
    pub certs_coll_name: String,
    pub accounts_coll_name: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            certs_coll_name: DEFAULT_CERTS_COLLECTION.to_string(),
            accounts_coll_name: DEFAULT_ACCOUNTS_COLLECTION.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreOptions {
    pub fn in_memory() -> Self {
        Self {
            database: IN_MEMORY_DATABASE.to_string(),
            ..Self::default()
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    /// Parses options from JSON, filling defaults and validating the result.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(raw).map_err(ConfigError::InvalidJson)?;
        options.validate()?;
        Ok(options)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.trim() == IN_MEMORY_DATABASE
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        for name in [&self.certs_coll_name, &self.accounts_coll_name] {
            if !is_valid_identifier(name) {
                return Err(ConfigError::InvalidCollectionName(name.clone()));
            }
        }
        if self.certs_coll_name == self.accounts_coll_name {
            return Err(ConfigError::DuplicateCollectionName(
                self.certs_coll_name.clone(),
            ));
        }
        Ok(())
    }
}
