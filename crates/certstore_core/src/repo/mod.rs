//! Repository layer for account and certificate records.
//!
//! # Responsibility
//! - Translate `RecordQuery` keys into document filters and insert seeds.
//! - Route every create-or-update through the collection's atomic upsert.
//! - Decode stored documents into typed records.
//!
//! # Invariants
//! - Caller payloads can never set `id`, `_id` or `created`.
//! - An unavailable store degrades to "not found"/"no effect", never an error.
//! - Other store errors are passed through unchanged.

pub mod account_repo;
pub mod certificate_repo;

use crate::db::{now_epoch_ms, DbError, DbResult, Document};
use crate::model::query::RecordQuery;
use crate::model::RecordValidationError;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Payload keys owned by the store on every record kind.
const STORE_OWNED_FIELDS: [&str; 3] = ["id", "_id", "created"];

#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Maps `DbError::Unavailable` to `Ok(None)` and logs the degradation.
fn degrade<T>(event: &str, collection: &str, result: DbResult<Option<T>>) -> RepoResult<Option<T>> {
    match result {
        Err(err) if err.is_unavailable() => {
            warn!(
                "event={event} module=repo status=degraded collection={collection} reason=store_unavailable"
            );
            Ok(None)
        }
        other => other.map_err(RepoError::from),
    }
}

/// Serializes a write payload and drops store-owned plus `extra_owned` keys.
fn write_fields<T: Serialize>(payload: &T, extra_owned: &[&str]) -> RepoResult<Map<String, Value>> {
    let mut fields = match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            return Err(RepoError::InvalidData(format!(
                "write payload must be an object, got {other}"
            )))
        }
        Err(err) => return Err(RepoError::InvalidData(err.to_string())),
    };
    for key in STORE_OWNED_FIELDS.iter().chain(extra_owned) {
        fields.remove(*key);
    }
    Ok(fields)
}

/// Fields applied only when an upsert inserts: `created` plus the values
/// of the query keys named in `seeded`.
fn insert_defaults(query: &RecordQuery, seeded: &[&str]) -> Map<String, Value> {
    let mut defaults = Map::new();
    for key in query.keys().filter(|key| seeded.contains(&key.name())) {
        defaults.insert(key.name().to_string(), key.to_value());
    }
    defaults.insert("created".to_string(), Value::from(now_epoch_ms()));
    defaults
}

fn decode<T: DeserializeOwned>(collection: &str, document: Document) -> RepoResult<T> {
    let id = document.id;
    document.into_record().map_err(|err| {
        RepoError::InvalidData(format!("document {collection}/{id} does not decode: {err}"))
    })
}
