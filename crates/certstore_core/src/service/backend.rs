//! Store-backed account and certificate services sharing one store.
//!
//! # Invariants
//! - Both services use the same `Store` and therefore the same connection.
//! - A backend built over an unopened or closed store answers every call
//!   with "not found"/"no effect".

use crate::config::StoreOptions;
use crate::db::SqliteCollection;
use crate::repo::account_repo::StoreAccountRepository;
use crate::repo::certificate_repo::StoreCertificateRepository;
use crate::service::account_service::AccountService;
use crate::service::certificate_service::CertificateService;
use crate::service::{ServiceError, ServiceResult};
use crate::store::Store;
use std::sync::Arc;

pub type StoreAccountService = AccountService<StoreAccountRepository<SqliteCollection>>;
pub type StoreCertificateService = CertificateService<StoreCertificateRepository<SqliteCollection>>;

pub struct Backend {
    store: Arc<Store>,
    accounts: StoreAccountService,
    certificates: StoreCertificateService,
}

impl Backend {
    /// Builds a store from `options`, opens it and wires both services.
    ///
    /// # Errors
    /// - `ServiceError::Config` for invalid options.
    /// - `ServiceError::Setup` when connection or index setup fails.
    pub fn create(options: StoreOptions) -> ServiceResult<Self> {
        let store = Arc::new(Store::new(options)?);
        store.open().map_err(ServiceError::Setup)?;
        Self::new(store)
    }

    /// Wires services over `store` without opening it.
    pub fn new(store: Arc<Store>) -> ServiceResult<Self> {
        let accounts = store.accounts().map_err(ServiceError::Setup)?;
        let certificates = store.certificates().map_err(ServiceError::Setup)?;
        Ok(Self {
            accounts: AccountService::new(StoreAccountRepository::new(accounts)),
            certificates: CertificateService::new(StoreCertificateRepository::new(certificates)),
            store,
        })
    }

    pub fn options(&self) -> &StoreOptions {
        self.store.options()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn accounts(&self) -> &StoreAccountService {
        &self.accounts
    }

    pub fn certificates(&self) -> &StoreCertificateService {
        &self.certificates
    }

    pub fn close(&self) -> ServiceResult<()> {
        self.store.close().map_err(ServiceError::Setup)
    }
}
