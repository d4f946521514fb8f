//! SQLite storage bootstrap, schema migrations and the document collection.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the record store.
//! - Apply schema migrations in deterministic order.
//! - Provide the generic JSON document collection used by repositories.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No document is read or written before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod collection;
pub mod migrations;
mod open;

pub use collection::{Document, DocumentCollection, DocumentId, Filter, SqliteCollection};
pub use open::{bootstrap_connection, open_db, open_db_in_memory, DEFAULT_BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

/// Current wall-clock time in epoch milliseconds.
///
/// Clocks set before the epoch report `0` rather than failing a write.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// One `ensure_index` call that failed during store setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
    pub collection: String,
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// No connection is open: the store was never opened or already closed.
    Unavailable,
    /// `open` was called on a store that has already been closed.
    Closed,
    LockPoisoned,
    InvalidIdentifier(String),
    /// A membership filter listed no values.
    EmptyFilter(String),
    InvalidDocument {
        collection: String,
        id: String,
        message: String,
    },
    IndexSetup(Vec<IndexFailure>),
}

impl DbError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "document serialization failed: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Unavailable => write!(f, "record store is not connected"),
            Self::Closed => write!(f, "record store has been closed"),
            Self::LockPoisoned => write!(f, "record store connection lock is poisoned"),
            Self::InvalidIdentifier(value) => {
                write!(f, "invalid collection or field name `{value}`")
            }
            Self::EmptyFilter(field) => write!(f, "filter on `{field}` lists no values"),
            Self::InvalidDocument {
                collection,
                id,
                message,
            } => write!(f, "invalid stored document {collection}/{id}: {message}"),
            Self::IndexSetup(failures) => {
                write!(f, "failed to create {} index(es):", failures.len())?;
                for failure in failures {
                    write!(
                        f,
                        " [{}.{}: {}]",
                        failure.collection, failure.field, failure.message
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
