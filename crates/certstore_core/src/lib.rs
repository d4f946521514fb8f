//! Persistence backend for ACME account and TLS certificate records.
//!
//! Records live in a JSON document store on SQLite and are resolved by any
//! of several keys: id, account id, email, or any domain in a certificate's
//! domain set.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, StoreOptions};
pub use db::{DbError, DbResult, Document, DocumentCollection, Filter, SqliteCollection};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::account::{Account, AccountUpdate, Keypair};
pub use model::certificate::{Certificate, CertificateUpdate};
pub use model::query::{QueryError, QueryKey, RecordQuery};
pub use model::{RecordId, RecordValidationError};
pub use repo::account_repo::{AccountRepository, StoreAccountRepository};
pub use repo::certificate_repo::{CertificateRepository, StoreCertificateRepository};
pub use repo::{RepoError, RepoResult};
pub use service::account_service::AccountService;
pub use service::backend::{Backend, StoreAccountService, StoreCertificateService};
pub use service::certificate_service::CertificateService;
pub use service::{ServiceError, ServiceResult};
pub use store::Store;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
