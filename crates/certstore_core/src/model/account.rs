//! ACME account record and keypair model.

use super::{RecordId, RecordValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account (or certificate) keypair in PEM and/or JWK form.
///
/// Unknown members are kept in `extra` and written back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_jwk: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keypair {
    pub fn from_pem(private_key_pem: impl Into<String>) -> Self {
        Self {
            private_key_pem: Some(private_key_pem.into()),
            ..Self::default()
        }
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key_pem.is_some() || self.private_key_jwk.is_some()
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.has_private_key() {
            Ok(())
        } else {
            Err(RecordValidationError::MissingPrivateKey)
        }
    }
}

/// Stored account document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<Keypair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Value>,
    /// Terms-of-service agreement as sent by the caller (flag or ToS URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agree_tos: Option<Value>,
    /// Epoch milliseconds of the first insert.
    #[serde(default)]
    pub created: i64,
    /// Pass-through registration attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields to merge into an account. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<Keypair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agree_tos: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountUpdate {
    pub fn with_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Some(keypair),
            ..Self::default()
        }
    }
}
