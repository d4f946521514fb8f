//! TLS certificate record model.

use super::account::Keypair;
use super::{normalize_domain, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored certificate document.
///
/// A certificate is "for" every name in `domains` (subject plus altnames).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: RecordId,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<Keypair>,
    /// Epoch milliseconds, when known exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub created: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Certificate {
    /// Returns whether `domain` is listed in this certificate's domain set.
    pub fn covers(&self, domain: &str) -> bool {
        normalize_domain(domain).is_some_and(|wanted| {
            self.domains
                .iter()
                .any(|stored| normalize_domain(stored).as_deref() == Some(wanted.as_str()))
        })
    }
}

/// Fields to merge into a certificate. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateUpdate {
    /// Replaces the whole domain set when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CertificateUpdate {
    /// PEM triple as returned by an ACME order.
    pub fn pems(
        cert: impl Into<String>,
        privkey: impl Into<String>,
        chain: impl Into<String>,
    ) -> Self {
        Self {
            cert: Some(cert.into()),
            privkey: Some(privkey.into()),
            chain: Some(chain.into()),
            ..Self::default()
        }
    }
}
