//! Lookup keys for account and certificate records.
//!
//! # Responsibility
//! - Represent each accepted lookup key as one explicit variant.
//! - Parse the loosely-shaped JSON query objects used by upstream callers.
//!
//! # Invariants
//! - A query always carries at least one usable key; there is no
//!   "match everything" query.
//! - Keys are kept in precedence order: `id`/`_id` > `accountId` > `email`
//!   > `domains`. Repositories use the strongest key that can name a record.
//! - `id`/`_id` values that are not store-assigned identifiers are ignored.
//! - Domain keys are normalized the same way stored domains are.

use super::{normalize_domains, RecordId};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    NotAnObject,
    /// None of `id`, `_id`, `accountId`, `email`, `domains` carried a value.
    NoRecognizedKey,
    InvalidKey {
        key: &'static str,
        reason: String,
    },
    EmptyDomains,
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "query must be a JSON object"),
            Self::NoRecognizedKey => write!(
                f,
                "query needs one of `id`, `accountId`, `email` or `domains`"
            ),
            Self::InvalidKey { key, reason } => write!(f, "invalid `{key}` in query: {reason}"),
            Self::EmptyDomains => write!(f, "`domains` query lists no usable domain"),
        }
    }
}

impl Error for QueryError {}

/// One lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKey {
    /// Store-assigned identifier.
    Id(RecordId),
    /// Owning account. For account records this is the record's own id.
    AccountId(String),
    Email(String),
    /// Any record whose domain set contains one of these names.
    Domains(Vec<String>),
}

impl QueryKey {
    /// Stored field name the key matches; never includes the key value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::AccountId(_) => "accountId",
            Self::Email(_) => "email",
            Self::Domains(_) => "domains",
        }
    }

    /// The key as a stored field value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Id(id) => Value::String(id.to_string()),
            Self::AccountId(value) | Self::Email(value) => Value::String(value.clone()),
            Self::Domains(domains) => {
                Value::Array(domains.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Record lookup: a primary key plus weaker keys from the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    primary: QueryKey,
    fallbacks: Vec<QueryKey>,
}

impl RecordQuery {
    pub fn by_id(id: RecordId) -> Self {
        Self::from(QueryKey::Id(id))
    }

    pub fn by_account_id(account_id: impl AsRef<str>) -> Result<Self, QueryError> {
        let trimmed = account_id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidKey {
                key: "accountId",
                reason: "value is blank".to_string(),
            });
        }
        Ok(Self::from(QueryKey::AccountId(trimmed.to_string())))
    }

    pub fn by_email(email: impl AsRef<str>) -> Result<Self, QueryError> {
        let trimmed = email.as_ref().trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidKey {
                key: "email",
                reason: "value is blank".to_string(),
            });
        }
        Ok(Self::from(QueryKey::Email(trimmed.to_string())))
    }

    pub fn by_domains<S: AsRef<str>>(domains: &[S]) -> Result<Self, QueryError> {
        let normalized = normalize_domains(domains);
        if normalized.is_empty() {
            return Err(QueryError::EmptyDomains);
        }
        Ok(Self::from(QueryKey::Domains(normalized)))
    }

    /// Adds a weaker key. Keys of a kind already present are ignored.
    pub fn or(mut self, key: QueryKey) -> Self {
        if self.keys().all(|existing| existing.name() != key.name()) {
            self.fallbacks.push(key);
        }
        self
    }

    /// Parses an upstream query object such as `{"email": "a@x.com"}` or
    /// `{"domains": ["example.com"], "email": "a@x.com"}`. Blank values count
    /// as absent.
    pub fn from_json(query: &Value) -> Result<Self, QueryError> {
        let object = query.as_object().ok_or(QueryError::NotAnObject)?;
        let mut keys = Vec::new();

        for key in ["id", "_id"] {
            if let Some(raw) = non_blank_str(object.get(key), "id")? {
                if let Ok(id) = Uuid::parse_str(raw) {
                    keys.push(QueryKey::Id(id));
                    break;
                }
            }
        }

        if let Some(raw) = non_blank_str(object.get("accountId"), "accountId")? {
            keys.push(QueryKey::AccountId(raw.to_string()));
        }

        if let Some(raw) = non_blank_str(object.get("email"), "email")? {
            keys.push(QueryKey::Email(raw.to_string()));
        }

        let domains = domains_value(object.get("domains"))?;
        if let Some(domains) = &domains {
            if !domains.is_empty() {
                keys.push(QueryKey::Domains(domains.clone()));
            }
        }

        let mut keys = keys.into_iter();
        match keys.next() {
            Some(primary) => Ok(Self {
                primary,
                fallbacks: keys.collect(),
            }),
            None if domains.is_some() => Err(QueryError::EmptyDomains),
            None => Err(QueryError::NoRecognizedKey),
        }
    }

    pub fn primary(&self) -> &QueryKey {
        &self.primary
    }

    /// Weaker keys, strongest first.
    pub fn fallbacks(&self) -> &[QueryKey] {
        &self.fallbacks
    }

    /// Every key, strongest first.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Primary key name for diagnostics.
    pub fn key_name(&self) -> &'static str {
        self.primary.name()
    }
}

impl From<QueryKey> for RecordQuery {
    fn from(primary: QueryKey) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }
}

fn non_blank_str<'a>(
    value: Option<&'a Value>,
    key: &'static str,
) -> Result<Option<&'a str>, QueryError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.trim())),
        Some(other) => Err(QueryError::InvalidKey {
            key,
            reason: format!("expected string, got {other}"),
        }),
    }
}

/// Normalized `domains` entries; `None` when the key is absent.
fn domains_value(value: Option<&Value>) -> Result<Option<Vec<String>>, QueryError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(single)) => Ok(Some(normalize_domains(&[single.as_str()]))),
        Some(Value::Array(items)) => {
            let mut domains = Vec::with_capacity(items.len());
            for item in items {
                let domain = item.as_str().ok_or_else(|| QueryError::InvalidKey {
                    key: "domains",
                    reason: format!("expected string entries, got {item}"),
                })?;
                domains.push(domain);
            }
            Ok(Some(normalize_domains(&domains)))
        }
        Some(other) => Err(QueryError::InvalidKey {
            key: "domains",
            reason: format!("expected string or array, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryError, QueryKey, RecordQuery};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn keys_are_ordered_by_precedence() {
        let id = Uuid::new_v4();
        let query = RecordQuery::from_json(&json!({
            "domains": ["example.com"],
            "email": "a@x.com",
            "_id": id.to_string(),
        }))
        .unwrap();
        assert_eq!(query.primary(), &QueryKey::Id(id));
        assert_eq!(
            query.fallbacks(),
            &[
                QueryKey::Email("a@x.com".to_string()),
                QueryKey::Domains(vec!["example.com".to_string()]),
            ]
        );

        let query =
            RecordQuery::from_json(&json!({ "accountId": "acct-1", "email": " a@x.com " })).unwrap();
        assert_eq!(query.primary(), &QueryKey::AccountId("acct-1".to_string()));
        assert_eq!(query.fallbacks(), &[QueryKey::Email("a@x.com".to_string())]);
    }

    #[test]
    fn caller_made_up_ids_are_ignored() {
        let query = RecordQuery::from_json(&json!({
            "accountId": "_account_id",
            "id": "__account_id",
            "email": "john.doe@gmail.com",
        }))
        .unwrap();
        assert_eq!(
            query.keys().map(QueryKey::name).collect::<Vec<_>>(),
            vec!["accountId", "email"]
        );

        assert_eq!(
            RecordQuery::from_json(&json!({ "id": "not-a-uuid" })),
            Err(QueryError::NoRecognizedKey)
        );
    }

    #[test]
    fn domains_accept_string_or_array_and_are_normalized() {
        let query = RecordQuery::from_json(&json!({ "domains": "WWW.Example.com" })).unwrap();
        assert_eq!(
            query,
            RecordQuery::by_domains(&["www.example.com"]).unwrap()
        );

        let query =
            RecordQuery::from_json(&json!({ "domains": ["B.com", "a.com", "b.com"] })).unwrap();
        assert_eq!(
            query.primary(),
            &QueryKey::Domains(vec!["b.com".to_string(), "a.com".to_string()])
        );
    }

    #[test]
    fn queries_without_a_usable_key_are_rejected() {
        assert_eq!(
            RecordQuery::from_json(&json!({})),
            Err(QueryError::NoRecognizedKey)
        );
        assert_eq!(
            RecordQuery::from_json(&json!({ "email": "  ", "agreeTos": true })),
            Err(QueryError::NoRecognizedKey)
        );
        assert_eq!(
            RecordQuery::from_json(&json!({ "domains": [] })),
            Err(QueryError::EmptyDomains)
        );
        assert_eq!(
            RecordQuery::from_json(&json!(["email"])),
            Err(QueryError::NotAnObject)
        );
    }

    #[test]
    fn malformed_values_are_reported_with_their_key() {
        let err = RecordQuery::from_json(&json!({ "id": 7 })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidKey { key: "id", .. }));

        let err = RecordQuery::from_json(&json!({ "email": 42 })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidKey { key: "email", .. }));

        let err = RecordQuery::from_json(&json!({ "domains": [1, 2] })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidKey { key: "domains", .. }));
    }

    #[test]
    fn or_keeps_one_key_per_kind() {
        let query = RecordQuery::by_email("a@x.com")
            .unwrap()
            .or(QueryKey::Email("b@x.com".to_string()))
            .or(QueryKey::AccountId("acct-1".to_string()));
        assert_eq!(
            query.fallbacks(),
            &[QueryKey::AccountId("acct-1".to_string())]
        );
    }
}
