//! Use-case services consumed by the certificate-issuance workflow.
//!
//! # Responsibility
//! - Expose `check_keypair`, `set_keypair`, `check` and `set` per record kind.
//! - Accept either typed queries or the upstream JSON query objects.
//!
//! # Invariants
//! - "Not found" is `Ok(None)`, never an error.
//! - Services never bypass repository contracts.

pub mod account_service;
pub mod backend;
pub mod certificate_service;

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::query::QueryError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Config(ConfigError),
    /// Store setup (connection, migrations, indexes) failed.
    Setup(DbError),
    Query(QueryError),
    /// JSON write payload does not match the record's update shape.
    InvalidPayload(serde_json::Error),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Setup(err) => write!(f, "record store setup failed: {err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::InvalidPayload(err) => write!(f, "invalid write payload: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Setup(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::InvalidPayload(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<QueryError> for ServiceError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}
