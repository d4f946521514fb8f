//! Account use-case service.

use crate::model::account::{Account, AccountUpdate, Keypair};
use crate::model::query::RecordQuery;
use crate::repo::account_repo::AccountRepository;
use crate::service::{ServiceError, ServiceResult};
use serde_json::Value;

/// Upstream account operations over an `AccountRepository`.
pub struct AccountService<R: AccountRepository> {
    repo: R,
}

impl<R: AccountRepository> AccountService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns the stored keypair, or `None` when no account matches.
    pub fn check_keypair(&self, query: &RecordQuery) -> ServiceResult<Option<Keypair>> {
        Ok(self.repo.resolve_keypair(query)?)
    }

    /// Stores a keypair and returns the updated account.
    pub fn set_keypair(
        &self,
        query: &RecordQuery,
        keypair: &Keypair,
    ) -> ServiceResult<Option<Account>> {
        Ok(self.repo.upsert_keypair(query, keypair)?)
    }

    pub fn check(&self, query: &RecordQuery) -> ServiceResult<Option<Account>> {
        Ok(self.repo.resolve_account(query)?)
    }

    /// Merges registration fields (`receipt`, `agreeTos`, extensions).
    pub fn set(&self, query: &RecordQuery, update: &AccountUpdate) -> ServiceResult<Option<Account>> {
        Ok(self.repo.upsert_account(query, update)?)
    }

    pub fn check_keypair_json(&self, query: &Value) -> ServiceResult<Option<Keypair>> {
        self.check_keypair(&RecordQuery::from_json(query)?)
    }

    pub fn set_keypair_json(&self, query: &Value, keypair: &Value) -> ServiceResult<Option<Account>> {
        let keypair: Keypair =
            serde_json::from_value(keypair.clone()).map_err(ServiceError::InvalidPayload)?;
        self.set_keypair(&RecordQuery::from_json(query)?, &keypair)
    }

    pub fn check_json(&self, query: &Value) -> ServiceResult<Option<Account>> {
        self.check(&RecordQuery::from_json(query)?)
    }

    pub fn set_json(&self, query: &Value, fields: &Value) -> ServiceResult<Option<Account>> {
        let update: AccountUpdate =
            serde_json::from_value(fields.clone()).map_err(ServiceError::InvalidPayload)?;
        self.set(&RecordQuery::from_json(query)?, &update)
    }
}
