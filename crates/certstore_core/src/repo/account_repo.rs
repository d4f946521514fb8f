//! Account repository contract and document-store implementation.
//!
//! # Invariants
//! - `accountId` queries resolve the account's own identifier; a value that
//!   is not one falls through to the next query key.
//! - A newly created account inherits the query's `email`.
//! - Keypair writes replace the stored `keypair` attribute as a whole.
//! - `accountId` in a write payload never reaches the stored document.

use super::{decode, degrade, insert_defaults, write_fields, RepoResult};
use crate::db::{DocumentCollection, Filter};
use crate::model::account::{Account, AccountUpdate, Keypair};
use crate::model::query::{QueryKey, RecordQuery};
use log::{debug, info};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Repository interface for ACME account records.
pub trait AccountRepository {
    /// Returns the stored keypair of the matching account.
    fn resolve_keypair(&self, query: &RecordQuery) -> RepoResult<Option<Keypair>>;
    fn resolve_account(&self, query: &RecordQuery) -> RepoResult<Option<Account>>;
    /// Stores `keypair` on the matching account, creating it if needed.
    fn upsert_keypair(&self, query: &RecordQuery, keypair: &Keypair)
        -> RepoResult<Option<Account>>;
    /// Merges `update` into the matching account, creating it if needed.
    fn upsert_account(
        &self,
        query: &RecordQuery,
        update: &AccountUpdate,
    ) -> RepoResult<Option<Account>>;
}

/// Account repository over any document collection.
pub struct StoreAccountRepository<C: DocumentCollection> {
    collection: C,
}

impl<C: DocumentCollection> StoreAccountRepository<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    fn find(&self, event: &str, query: &RecordQuery) -> RepoResult<Option<Account>> {
        let Some(filter) = account_filter(query) else {
            debug!(
                "event={event} module=repo status=ok key={} hit=false reason=unresolvable_key",
                query.key_name()
            );
            return Ok(None);
        };
        let found = degrade(event, self.collection.name(), self.collection.find_one(&filter))?;
        found
            .map(|document| decode(self.collection.name(), document))
            .transpose()
    }

    fn write(
        &self,
        event: &str,
        query: &RecordQuery,
        fields: Map<String, Value>,
    ) -> RepoResult<Option<Account>> {
        let Some(filter) = account_filter(query) else {
            debug!(
                "event={event} module=repo status=skipped key={} reason=unresolvable_key",
                query.key_name()
            );
            return Ok(None);
        };
        let written = degrade(
            event,
            self.collection.name(),
            self.collection
                .upsert(&filter, &fields, &insert_defaults(query, &["email"])),
        )?;
        let account = written
            .map(|document| decode::<Account>(self.collection.name(), document))
            .transpose()?;
        if let Some(account) = &account {
            info!(
                "event={event} module=repo status=ok key={} id={}",
                query.key_name(),
                account.id
            );
        }
        Ok(account)
    }
}

impl<C: DocumentCollection> AccountRepository for StoreAccountRepository<C> {
    fn resolve_keypair(&self, query: &RecordQuery) -> RepoResult<Option<Keypair>> {
        Ok(self
            .find("account_keypair_get", query)?
            .and_then(|account| account.keypair))
    }

    fn resolve_account(&self, query: &RecordQuery) -> RepoResult<Option<Account>> {
        self.find("account_get", query)
    }

    fn upsert_keypair(
        &self,
        query: &RecordQuery,
        keypair: &Keypair,
    ) -> RepoResult<Option<Account>> {
        keypair.validate()?;
        let fields = write_fields(&AccountUpdate::with_keypair(keypair.clone()), &["accountId"])?;
        self.write("account_keypair_set", query, fields)
    }

    fn upsert_account(
        &self,
        query: &RecordQuery,
        update: &AccountUpdate,
    ) -> RepoResult<Option<Account>> {
        if let Some(keypair) = &update.keypair {
            keypair.validate()?;
        }
        let fields = write_fields(update, &["accountId"])?;
        self.write("account_set", query, fields)
    }
}

/// Filter for the strongest key that can name an account; `None` when no
/// key can (e.g. only a non-UUID account id).
fn account_filter(query: &RecordQuery) -> Option<Filter> {
    query.keys().find_map(key_filter)
}

fn key_filter(key: &QueryKey) -> Option<Filter> {
    match key {
        QueryKey::Id(id) => Some(Filter::Id(*id)),
        QueryKey::AccountId(raw) => Uuid::parse_str(raw).ok().map(Filter::Id),
        QueryKey::Email(email) => Some(Filter::field_eq("email", email.as_str())),
        QueryKey::Domains(domains) => Some(Filter::field_any_of("domains", domains.clone())),
    }
}
