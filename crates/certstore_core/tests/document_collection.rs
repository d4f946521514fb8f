use certstore_core::{DbError, DocumentCollection, Filter, SqliteCollection, Store, StoreOptions};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

fn open_collection(name: &str) -> SqliteCollection {
    let store = Arc::new(Store::new(StoreOptions::in_memory()).unwrap());
    store.open().unwrap();
    SqliteCollection::new(store, name).unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn upsert_inserts_seeded_document_and_applies_defaults_once() {
    let collection = open_collection("widgets");
    let filter = Filter::field_eq("owner", "alice");

    let inserted = collection
        .upsert(
            &filter,
            &object(json!({ "color": "red" })),
            &object(json!({ "created": 1 })),
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        Value::Object(inserted.body.clone()),
        json!({ "owner": "alice", "color": "red", "created": 1 })
    );

    let updated = collection
        .upsert(
            &filter,
            &object(json!({ "size": 3 })),
            &object(json!({ "created": 2 })),
        )
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, inserted.id);
    assert_eq!(
        Value::Object(updated.body),
        json!({ "owner": "alice", "color": "red", "created": 1, "size": 3 })
    );
}

#[test]
fn id_filter_never_creates_documents() {
    let collection = open_collection("widgets");
    let missing = Filter::Id(Uuid::new_v4());

    let result = collection
        .upsert(&missing, &object(json!({ "color": "red" })), &Map::new())
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(collection.find_one(&missing).unwrap(), None);
}

#[test]
fn empty_membership_filter_is_rejected_for_writes_and_misses_for_reads() {
    let collection = open_collection("widgets");
    let empty = Filter::field_any_of("tags", Vec::new());

    assert_eq!(collection.find_one(&empty).unwrap(), None);
    let err = collection
        .upsert(&empty, &object(json!({ "color": "red" })), &Map::new())
        .unwrap_err();
    assert!(matches!(err, DbError::EmptyFilter(field) if field == "tags"));
}

#[test]
fn invalid_field_names_never_reach_sql() {
    let collection = open_collection("widgets");

    let err = collection
        .find_one(&Filter::field_eq("owner') OR 1=1 --", "x"))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier(_)));
    assert!(matches!(
        collection.ensure_index("bad field").unwrap_err(),
        DbError::InvalidIdentifier(_)
    ));
}

#[test]
fn membership_lookup_works_before_and_after_indexing() {
    let collection = open_collection("widgets");
    let stored = collection
        .upsert(
            &Filter::field_eq("owner", "alice"),
            &object(json!({ "tags": ["blue", "round"] })),
            &Map::new(),
        )
        .unwrap()
        .unwrap();

    let by_tag = Filter::field_any_of("tags", vec!["round".to_string()]);
    assert_eq!(collection.find_one(&by_tag).unwrap().unwrap().id, stored.id);

    collection.ensure_index("tags").unwrap();
    collection.ensure_index("tags").unwrap();
    assert_eq!(collection.find_one(&by_tag).unwrap().unwrap().id, stored.id);

    let missing = Filter::field_any_of("tags", vec!["square".to_string()]);
    assert_eq!(collection.find_one(&missing).unwrap(), None);
}

#[test]
fn released_key_passes_to_remaining_holder() {
    let collection = open_collection("widgets");
    collection.ensure_index("tags").unwrap();
    let alice = Filter::field_eq("owner", "alice");
    let bob = Filter::field_eq("owner", "bob");
    let shared = Filter::field_any_of("tags", vec!["shared".to_string()]);

    let first = collection
        .upsert(&alice, &object(json!({ "tags": ["blue", "shared"] })), &Map::new())
        .unwrap()
        .unwrap();
    let second = collection
        .upsert(&bob, &object(json!({ "tags": ["shared", "red"] })), &Map::new())
        .unwrap()
        .unwrap();
    assert_eq!(collection.find_one(&shared).unwrap().unwrap().id, second.id);

    collection
        .upsert(&bob, &object(json!({ "tags": ["red"] })), &Map::new())
        .unwrap();
    assert_eq!(collection.find_one(&shared).unwrap().unwrap().id, first.id);

    collection
        .upsert(&alice, &object(json!({ "tags": ["blue"] })), &Map::new())
        .unwrap();
    assert_eq!(collection.find_one(&shared).unwrap(), None);
}

#[test]
fn payload_fields_win_over_insert_defaults() {
    let collection = open_collection("widgets");
    let inserted = collection
        .upsert(
            &Filter::field_eq("owner", "alice"),
            &object(json!({ "color": "red" })),
            &object(json!({ "color": "grey", "created": 1 })),
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        Value::Object(inserted.body),
        json!({ "owner": "alice", "color": "red", "created": 1 })
    );
}

#[test]
fn collections_are_isolated_from_each_other() {
    let store = Arc::new(Store::new(StoreOptions::in_memory()).unwrap());
    store.open().unwrap();
    let accounts = store.accounts().unwrap();
    let certificates = store.certificates().unwrap();
    let filter = Filter::field_eq("email", "a@x.com");

    accounts
        .upsert(&filter, &object(json!({ "agreeTos": true })), &Map::new())
        .unwrap();
    assert_eq!(certificates.find_one(&filter).unwrap(), None);
    assert!(accounts.find_one(&filter).unwrap().is_some());
}

#[test]
fn document_decodes_with_id_field() {
    let collection = open_collection("widgets");
    let stored = collection
        .upsert(
            &Filter::field_eq("owner", "alice"),
            &Map::new(),
            &Map::new(),
        )
        .unwrap()
        .unwrap();

    let decoded: Value = stored.clone().into_record().unwrap();
    assert_eq!(decoded["id"], json!(stored.id.to_string()));
    assert_eq!(decoded["owner"], json!("alice"));
}
