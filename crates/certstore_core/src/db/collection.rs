//! JSON document collection over SQLite.
//!
//! # Responsibility
//! - Store one JSON object per document, grouped by collection name.
//! - Resolve a single document by id, by scalar field equality, or by
//!   membership of any listed value in an array field.
//! - Perform find-or-create-and-update as one atomic conditional write.
//!
//! # Invariants
//! - `id` is store-assigned (UUID v4) and never part of the stored body.
//! - `create_defaults` are applied only when a document is inserted.
//! - Each `(collection, field, value)` multi-key entry has at most one owner;
//!   the last document written with that value owns it. A value released by
//!   its owner passes to the most recently updated document still listing it.
//! - Collection and field names reach SQL only after identifier validation.

use crate::db::{now_epoch_ms, DbError, DbResult};
use crate::store::Store;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Store-assigned document identity.
pub type DocumentId = Uuid;

/// One stored document: identity plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub body: Map<String, Value>,
}

impl Document {
    /// Decodes the document into a typed record, exposing `id` as a field.
    pub fn into_record<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        let mut body = self.body;
        body.insert("id".to_string(), Value::String(self.id.to_string()));
        serde_json::from_value(Value::Object(body))
    }
}

/// Single-document selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Matches the document with this store-assigned id.
    Id(DocumentId),
    /// Matches documents whose scalar `field` equals `value`.
    FieldEq { field: String, value: String },
    /// Matches the document whose array `field` contains any of `values`.
    /// Values are tried in order; the first one with an owner decides.
    FieldAnyOf { field: String, values: Vec<String> },
}

impl Filter {
    pub fn field_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::FieldEq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field_any_of(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::FieldAnyOf {
            field: field.into(),
            values,
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::FieldEq { field, .. } | Self::FieldAnyOf { field, .. } => Some(field),
        }
    }

    /// Fields a freshly inserted document inherits from the filter.
    fn seed(&self) -> Map<String, Value> {
        let mut seed = Map::new();
        match self {
            Self::Id(_) => {}
            Self::FieldEq { field, value } => {
                seed.insert(field.clone(), Value::String(value.clone()));
            }
            Self::FieldAnyOf { field, values } => {
                let values = values.iter().cloned().map(Value::String).collect();
                seed.insert(field.clone(), Value::Array(values));
            }
        }
        seed
    }
}

/// Minimal document store contract consumed by repositories.
pub trait DocumentCollection: Send + Sync {
    /// Collection name, used for diagnostics.
    fn name(&self) -> &str;

    /// Returns the single document matching `filter`, or `None`.
    fn find_one(&self, filter: &Filter) -> DbResult<Option<Document>>;

    /// Atomically updates the document matching `filter` with `set_fields`,
    /// or inserts a new one seeded from the filter and `create_defaults`, then
    /// `set_fields`. Returns the post-update document.
    ///
    /// An `Id` filter that matches nothing has no effect and returns `None`.
    fn upsert(
        &self,
        filter: &Filter,
        set_fields: &Map<String, Value>,
        create_defaults: &Map<String, Value>,
    ) -> DbResult<Option<Document>>;

    /// Registers `field` as indexed. Idempotent.
    fn ensure_index(&self, field: &str) -> DbResult<()>;
}

/// `DocumentCollection` backed by the shared store connection.
#[derive(Clone)]
pub struct SqliteCollection {
    store: Arc<Store>,
    name: String,
}

impl SqliteCollection {
    pub fn new(store: Arc<Store>, name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self { store, name })
    }
}

impl DocumentCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_one(&self, filter: &Filter) -> DbResult<Option<Document>> {
        self.store.with_conn(|conn| {
            let found = match find_id(conn, &self.name, filter)? {
                Some(id) => Some(Document {
                    id,
                    body: load_body(conn, &self.name, id)?,
                }),
                None => None,
            };
            debug!(
                "event=doc_find module=db status=ok collection={} hit={}",
                self.name,
                found.is_some()
            );
            Ok(found)
        })
    }

    fn upsert(
        &self,
        filter: &Filter,
        set_fields: &Map<String, Value>,
        create_defaults: &Map<String, Value>,
    ) -> DbResult<Option<Document>> {
        self.store.with_conn(|conn| {
            let started_at = Instant::now();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = upsert_in_tx(&tx, &self.name, filter, set_fields, create_defaults)?;
            tx.commit()?;

            match &outcome {
                Some((document, inserted)) => info!(
                    "event=doc_upsert module=db status=ok collection={} id={} inserted={} duration_ms={}",
                    self.name,
                    document.id,
                    inserted,
                    started_at.elapsed().as_millis()
                ),
                None => info!(
                    "event=doc_upsert module=db status=skipped collection={} reason=id_not_found",
                    self.name
                ),
            }
            Ok(outcome.map(|(document, _)| document))
        })
    }

    fn ensure_index(&self, field: &str) -> DbResult<()> {
        self.store
            .with_conn(|conn| ensure_index_on(conn, &self.name, field))
    }
}

/// Returns whether `value` is usable as a collection or field name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

fn validate_identifier(value: &str) -> DbResult<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(value.to_string()))
    }
}

/// Registers an index for `field` and backfills multi-key entries for
/// documents already stored with an array value in that field.
pub(crate) fn ensure_index_on(conn: &mut Connection, collection: &str, field: &str) -> DbResult<()> {
    validate_identifier(collection)?;
    validate_identifier(field)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR IGNORE INTO collection_indexes (collection, field) VALUES (?1, ?2);",
        params![collection, field],
    )?;
    tx.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS idx_documents_field_{field}
         ON documents (collection, json_extract(body, '$.{field}'));"
    ))?;
    tx.execute(
        &format!(
            "INSERT INTO document_keys (collection, field, value, doc_id)
             SELECT d.collection, ?2, je.value, d.id
             FROM documents d, json_each(d.body, '$.{field}') je
             WHERE d.collection = ?1
               AND json_type(d.body, '$.{field}') = 'array'
               AND je.type = 'text'
             ORDER BY d.updated_at ASC, d.id ASC
             ON CONFLICT (collection, field, value) DO UPDATE SET doc_id = excluded.doc_id;"
        ),
        params![collection, field],
    )?;
    tx.commit()?;

    debug!("event=index_ensure module=db status=ok collection={collection} field={field}");
    Ok(())
}

fn upsert_in_tx(
    conn: &Connection,
    collection: &str,
    filter: &Filter,
    set_fields: &Map<String, Value>,
    create_defaults: &Map<String, Value>,
) -> DbResult<Option<(Document, bool)>> {
    if let Filter::FieldAnyOf { field, values } = filter {
        if values.is_empty() {
            return Err(DbError::EmptyFilter(field.clone()));
        }
    }

    let now = now_epoch_ms();
    let (id, body, inserted) = match find_id(conn, collection, filter)? {
        Some(id) => {
            let mut body = load_body(conn, collection, id)?;
            merge_fields(&mut body, set_fields);
            conn.execute(
                "UPDATE documents
                 SET body = ?3, updated_at = ?4
                 WHERE collection = ?1 AND id = ?2;",
                params![
                    collection,
                    id.to_string(),
                    serde_json::to_string(&body)?,
                    now
                ],
            )?;
            (id, body, false)
        }
        None => {
            if matches!(filter, Filter::Id(_)) {
                return Ok(None);
            }
            let id = Uuid::new_v4();
            let mut body = filter.seed();
            merge_fields(&mut body, create_defaults);
            merge_fields(&mut body, set_fields);
            conn.execute(
                "INSERT INTO documents (collection, id, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    collection,
                    id.to_string(),
                    serde_json::to_string(&body)?,
                    now
                ],
            )?;
            (id, body, true)
        }
    };

    refresh_document_keys(conn, collection, id, &body)?;
    Ok(Some((Document { id, body }, inserted)))
}

/// Top-level `$set`: supplied fields replace stored ones, others stay.
fn merge_fields(body: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        if key == "id" {
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
}

fn find_id(conn: &Connection, collection: &str, filter: &Filter) -> DbResult<Option<DocumentId>> {
    if let Some(field) = filter.field() {
        validate_identifier(field)?;
    }

    let id_text: Option<String> = match filter {
        Filter::Id(id) => conn
            .query_row(
                "SELECT id FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id.to_string()],
                |row| row.get(0),
            )
            .optional()?,
        Filter::FieldEq { field, value } => conn
            .query_row(
                &format!(
                    "SELECT id FROM documents
                     WHERE collection = ?1
                       AND json_extract(body, '$.{field}') = ?2
                     ORDER BY updated_at DESC, id ASC
                     LIMIT 1;"
                ),
                params![collection, value],
                |row| row.get(0),
            )
            .optional()?,
        Filter::FieldAnyOf { field, values } => {
            if is_indexed(conn, collection, field)? {
                find_owner_by_key(conn, collection, field, values)?
            } else {
                find_by_array_scan(conn, collection, field, values)?
            }
        }
    };

    id_text
        .map(|text| parse_document_id(collection, &text))
        .transpose()
}

fn find_owner_by_key(
    conn: &Connection,
    collection: &str,
    field: &str,
    values: &[String],
) -> DbResult<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id FROM document_keys
         WHERE collection = ?1 AND field = ?2 AND value = ?3;",
    )?;
    for value in values {
        let owner: Option<String> = stmt
            .query_row(params![collection, field, value], |row| row.get(0))
            .optional()?;
        if owner.is_some() {
            return Ok(owner);
        }
    }
    Ok(None)
}

fn find_by_array_scan(
    conn: &Connection,
    collection: &str,
    field: &str,
    values: &[String],
) -> DbResult<Option<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT d.id FROM documents d
         WHERE d.collection = ?1
           AND EXISTS (
               SELECT 1 FROM json_each(d.body, '$.{field}') je
               WHERE je.value = ?2
           )
         ORDER BY d.updated_at DESC, d.id ASC
         LIMIT 1;"
    ))?;
    for value in values {
        let found: Option<String> = stmt
            .query_row(params![collection, value], |row| row.get(0))
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

fn is_indexed(conn: &Connection, collection: &str, field: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM collection_indexes
            WHERE collection = ?1 AND field = ?2
        );",
        params![collection, field],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn refresh_document_keys(
    conn: &Connection,
    collection: &str,
    id: DocumentId,
    body: &Map<String, Value>,
) -> DbResult<()> {
    let id_text = id.to_string();
    let mut owned_stmt = conn.prepare(
        "SELECT field, value FROM document_keys WHERE collection = ?1 AND doc_id = ?2;",
    )?;
    let previously_owned = owned_stmt
        .query_map(params![collection, id_text], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    conn.execute(
        "DELETE FROM document_keys WHERE collection = ?1 AND doc_id = ?2;",
        params![collection, id_text],
    )?;

    let mut fields_stmt =
        conn.prepare("SELECT field FROM collection_indexes WHERE collection = ?1;")?;
    let fields = fields_stmt
        .query_map([collection], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut insert_stmt = conn.prepare(
        "INSERT INTO document_keys (collection, field, value, doc_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, field, value) DO UPDATE SET doc_id = excluded.doc_id;",
    )?;
    for field in &fields {
        let Some(Value::Array(items)) = body.get(field) else {
            continue;
        };
        for value in items.iter().filter_map(Value::as_str) {
            insert_stmt.execute(params![collection, field, value, id_text])?;
        }
    }

    for (field, value) in previously_owned {
        if lists_value(body, &field, &value) {
            continue;
        }
        reassign_key(conn, collection, &field, &value)?;
    }
    Ok(())
}

fn lists_value(body: &Map<String, Value>, field: &str, value: &str) -> bool {
    match body.get(field) {
        Some(Value::Array(items)) => items.iter().any(|item| item.as_str() == Some(value)),
        _ => false,
    }
}

/// Hands a released key to the most recently updated document listing it.
fn reassign_key(conn: &Connection, collection: &str, field: &str, value: &str) -> DbResult<()> {
    validate_identifier(field)?;
    let heir: Option<String> = conn
        .query_row(
            &format!(
                "SELECT d.id FROM documents d
                 WHERE d.collection = ?1
                   AND json_type(d.body, '$.{field}') = 'array'
                   AND EXISTS (
                       SELECT 1 FROM json_each(d.body, '$.{field}') je
                       WHERE je.type = 'text' AND je.value = ?2
                   )
                 ORDER BY d.updated_at DESC, d.id ASC
                 LIMIT 1;"
            ),
            params![collection, value],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(heir) = heir {
        conn.execute(
            "INSERT OR IGNORE INTO document_keys (collection, field, value, doc_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![collection, field, value, heir],
        )?;
        debug!("event=doc_key_reassign module=db status=ok collection={collection} field={field}");
    }
    Ok(())
}

fn load_body(conn: &Connection, collection: &str, id: DocumentId) -> DbResult<Map<String, Value>> {
    let text: String = conn.query_row(
        "SELECT body FROM documents WHERE collection = ?1 AND id = ?2;",
        params![collection, id.to_string()],
        |row| row.get(0),
    )?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(body)) => Ok(body),
        Ok(_) => Err(DbError::InvalidDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            message: "body is not a JSON object".to_string(),
        }),
        Err(err) => Err(DbError::InvalidDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            message: err.to_string(),
        }),
    }
}

fn parse_document_id(collection: &str, value: &str) -> DbResult<DocumentId> {
    Uuid::parse_str(value).map_err(|_| DbError::InvalidDocument {
        collection: collection.to_string(),
        id: value.to_string(),
        message: "id is not a UUID".to_string(),
    })
}
