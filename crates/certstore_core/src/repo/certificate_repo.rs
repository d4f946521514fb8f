//! Certificate repository contract and document-store implementation.
//!
//! # Invariants
//! - `domains` lookups are set-membership queries, not set equality.
//! - Stored domain names are normalized (lowercase, no trailing dot).
//! - `accountId` is an association field on certificates and is writable.
//! - An `id` key matches the certificate's own id first, then `accountId`.
//! - A newly created certificate inherits the query's `accountId`, `email`
//!   and `domains`.

use super::{decode, degrade, insert_defaults, write_fields, RepoError, RepoResult};
use crate::db::{DocumentCollection, Filter};
use crate::model::account::Keypair;
use crate::model::certificate::{Certificate, CertificateUpdate};
use crate::model::query::{QueryKey, RecordQuery};
use crate::model::{normalize_domain, RecordId, RecordValidationError};
use log::info;
use serde_json::{Map, Value};

/// Repository interface for certificate records.
pub trait CertificateRepository {
    /// Returns the certificate's keypair, falling back to its `privkey` PEM.
    fn resolve_keypair(&self, query: &RecordQuery) -> RepoResult<Option<Keypair>>;
    fn resolve_certificate(&self, query: &RecordQuery) -> RepoResult<Option<Certificate>>;
    fn upsert_keypair(
        &self,
        query: &RecordQuery,
        keypair: &Keypair,
    ) -> RepoResult<Option<Certificate>>;
    /// Merges `update` into the matching certificate, creating it if needed.
    fn upsert_certificate(
        &self,
        query: &RecordQuery,
        update: &CertificateUpdate,
    ) -> RepoResult<Option<Certificate>>;
}

/// Certificate repository over any document collection.
pub struct StoreCertificateRepository<C: DocumentCollection> {
    collection: C,
}

impl<C: DocumentCollection> StoreCertificateRepository<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    fn find(&self, event: &str, query: &RecordQuery) -> RepoResult<Option<Certificate>> {
        match query.primary() {
            QueryKey::Id(id) => match self.lookup(event, &Filter::Id(*id))? {
                Some(certificate) => Ok(Some(certificate)),
                None => self.lookup(event, &owner_filter(*id)),
            },
            _ => self.lookup(event, &key_filter(selecting_key(query))),
        }
    }

    fn lookup(&self, event: &str, filter: &Filter) -> RepoResult<Option<Certificate>> {
        let found = degrade(event, self.collection.name(), self.collection.find_one(filter))?;
        found
            .map(|document| decode(self.collection.name(), document))
            .transpose()
    }

    /// Picks the upsert target. An `id` that names no stored certificate is
    /// the owning account's id: it is written as `accountId` and the next
    /// query key selects the certificate.
    fn write_target(
        &self,
        event: &str,
        query: &RecordQuery,
    ) -> RepoResult<(Filter, Option<RecordId>)> {
        let QueryKey::Id(id) = query.primary() else {
            return Ok((key_filter(selecting_key(query)), None));
        };
        if self.lookup(event, &Filter::Id(*id))?.is_some() {
            return Ok((Filter::Id(*id), None));
        }
        let fallbacks = query.fallbacks();
        let filter = fallbacks
            .iter()
            .find(|key| matches!(key, QueryKey::Domains(_)))
            .or_else(|| fallbacks.first())
            .map(key_filter)
            .unwrap_or_else(|| owner_filter(*id));
        Ok((filter, Some(*id)))
    }

    fn write(
        &self,
        event: &str,
        query: &RecordQuery,
        mut fields: Map<String, Value>,
    ) -> RepoResult<Option<Certificate>> {
        let (filter, owner) = self.write_target(event, query)?;
        if let Some(owner) = owner {
            fields
                .entry("accountId")
                .or_insert_with(|| Value::String(owner.to_string()));
        }
        let written = degrade(
            event,
            self.collection.name(),
            self.collection.upsert(
                &filter,
                &fields,
                &insert_defaults(query, &["accountId", "email", "domains"]),
            ),
        )?;
        let certificate = written
            .map(|document| decode::<Certificate>(self.collection.name(), document))
            .transpose()?;
        if let Some(certificate) = &certificate {
            info!(
                "event={event} module=repo status=ok key={} id={} domain_count={} owner_from_id={}",
                query.key_name(),
                certificate.id,
                certificate.domains.len(),
                owner.is_some()
            );
        }
        Ok(certificate)
    }
}

impl<C: DocumentCollection> CertificateRepository for StoreCertificateRepository<C> {
    fn resolve_keypair(&self, query: &RecordQuery) -> RepoResult<Option<Keypair>> {
        Ok(self
            .find("certificate_keypair_get", query)?
            .and_then(|certificate| match certificate.keypair {
                Some(keypair) => Some(keypair),
                None => certificate.privkey.map(Keypair::from_pem),
            }))
    }

    fn resolve_certificate(&self, query: &RecordQuery) -> RepoResult<Option<Certificate>> {
        self.find("certificate_get", query)
    }

    fn upsert_keypair(
        &self,
        query: &RecordQuery,
        keypair: &Keypair,
    ) -> RepoResult<Option<Certificate>> {
        keypair.validate()?;
        let mut fields = Map::new();
        fields.insert(
            "keypair".to_string(),
            serde_json::to_value(keypair).map_err(|err| RepoError::InvalidData(err.to_string()))?,
        );
        self.write("certificate_keypair_set", query, fields)
    }

    fn upsert_certificate(
        &self,
        query: &RecordQuery,
        update: &CertificateUpdate,
    ) -> RepoResult<Option<Certificate>> {
        let mut update = update.clone();
        if let Some(domains) = update.domains.take() {
            update.domains = Some(validated_domains(&domains)?);
        }
        let fields = write_fields(&update, &[])?;
        self.write("certificate_set", query, fields)
    }
}

/// Key that names one certificate: its own id, else its domain set, else the
/// strongest association key (`accountId`, `email`), which may own several.
fn selecting_key(query: &RecordQuery) -> &QueryKey {
    if matches!(query.primary(), QueryKey::Id(_)) {
        return query.primary();
    }
    query
        .keys()
        .find(|key| matches!(key, QueryKey::Domains(_)))
        .unwrap_or(query.primary())
}

fn key_filter(key: &QueryKey) -> Filter {
    match key {
        QueryKey::Id(id) => Filter::Id(*id),
        QueryKey::AccountId(account_id) => Filter::field_eq("accountId", account_id.as_str()),
        QueryKey::Email(email) => Filter::field_eq("email", email.as_str()),
        QueryKey::Domains(domains) => Filter::field_any_of("domains", domains.clone()),
    }
}

fn owner_filter(account_id: RecordId) -> Filter {
    Filter::field_eq("accountId", account_id.to_string())
}

/// Normalizes a supplied domain set, rejecting blank entries.
fn validated_domains(domains: &[String]) -> Result<Vec<String>, RecordValidationError> {
    let mut normalized: Vec<String> = Vec::with_capacity(domains.len());
    for raw in domains {
        let domain =
            normalize_domain(raw).ok_or_else(|| RecordValidationError::InvalidDomain(raw.clone()))?;
        if !normalized.contains(&domain) {
            normalized.push(domain);
        }
    }
    Ok(normalized)
}
