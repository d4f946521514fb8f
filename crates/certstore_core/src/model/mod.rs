//! Record and query models for ACME accounts and certificates.
//!
//! # Invariants
//! - Every stored record is identified by a store-assigned `RecordId`.
//! - `created` is stamped once on insert and never rewritten.
//! - Lookups are expressed as typed `QueryKey`s in precedence order, never
//!   as a bag of optional fields.

pub mod account;
pub mod certificate;
pub mod query;

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Store-assigned stable identifier shared by both record kinds.
pub type RecordId = Uuid;

/// Validation failures for record write payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    /// A keypair must carry a PEM or JWK private key.
    MissingPrivateKey,
    /// A domain entry normalized to an empty string.
    InvalidDomain(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPrivateKey => {
                write!(f, "keypair needs privateKeyPem or privateKeyJwk")
            }
            Self::InvalidDomain(value) => write!(f, "invalid domain name `{value}`"),
        }
    }
}

impl Error for RecordValidationError {}

/// Normalizes one domain name: trimmed, lowercase, no trailing dot.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Normalizes domains, keeping first-seen order and dropping duplicates.
pub fn normalize_domains<S: AsRef<str>>(domains: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(domains.len());
    for domain in domains {
        if let Some(value) = normalize_domain(domain.as_ref()) {
            if !normalized.contains(&value) {
                normalized.push(value);
            }
        }
    }
    normalized
}
