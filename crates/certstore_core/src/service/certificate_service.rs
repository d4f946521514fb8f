//! Certificate use-case service.

use crate::model::account::Keypair;
use crate::model::certificate::{Certificate, CertificateUpdate};
use crate::model::query::RecordQuery;
use crate::repo::certificate_repo::CertificateRepository;
use crate::service::{ServiceError, ServiceResult};
use serde_json::Value;

/// Upstream certificate operations over a `CertificateRepository`.
pub struct CertificateService<R: CertificateRepository> {
    repo: R,
}

impl<R: CertificateRepository> CertificateService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn check_keypair(&self, query: &RecordQuery) -> ServiceResult<Option<Keypair>> {
        Ok(self.repo.resolve_keypair(query)?)
    }

    pub fn set_keypair(
        &self,
        query: &RecordQuery,
        keypair: &Keypair,
    ) -> ServiceResult<Option<Certificate>> {
        Ok(self.repo.upsert_keypair(query, keypair)?)
    }

    /// Returns the certificate covering any of the queried names, if stored.
    pub fn check(&self, query: &RecordQuery) -> ServiceResult<Option<Certificate>> {
        Ok(self.repo.resolve_certificate(query)?)
    }

    /// Saves PEMs (`cert`, `privkey`, `chain`) and association fields.
    pub fn set(
        &self,
        query: &RecordQuery,
        update: &CertificateUpdate,
    ) -> ServiceResult<Option<Certificate>> {
        Ok(self.repo.upsert_certificate(query, update)?)
    }

    pub fn check_keypair_json(&self, query: &Value) -> ServiceResult<Option<Keypair>> {
        self.check_keypair(&RecordQuery::from_json(query)?)
    }

    pub fn set_keypair_json(
        &self,
        query: &Value,
        keypair: &Value,
    ) -> ServiceResult<Option<Certificate>> {
        let keypair: Keypair =
            serde_json::from_value(keypair.clone()).map_err(ServiceError::InvalidPayload)?;
        self.set_keypair(&RecordQuery::from_json(query)?, &keypair)
    }

    pub fn check_json(&self, query: &Value) -> ServiceResult<Option<Certificate>> {
        self.check(&RecordQuery::from_json(query)?)
    }

    pub fn set_json(&self, query: &Value, pems: &Value) -> ServiceResult<Option<Certificate>> {
        let update: CertificateUpdate =
            serde_json::from_value(pems.clone()).map_err(ServiceError::InvalidPayload)?;
        self.set(&RecordQuery::from_json(query)?, &update)
    }
}
