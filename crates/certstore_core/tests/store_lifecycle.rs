use certstore_core::db::{open_db, DbError, DEFAULT_BUSY_TIMEOUT};
use certstore_core::{
    AccountUpdate, Backend, CertificateUpdate, Keypair, RecordQuery, ServiceError, Store,
    StoreOptions,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn file_options(path: &Path) -> StoreOptions {
    StoreOptions::file(path.to_str().unwrap())
}

fn count_documents(path: &Path, collection: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE collection = ?1;",
        [collection],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn unopened_store_degrades_to_not_found() {
    let store = Arc::new(Store::new(StoreOptions::in_memory()).unwrap());
    let backend = Backend::new(store).unwrap();
    let email = RecordQuery::by_email("a@x.com").unwrap();
    let domains = RecordQuery::by_domains(&["example.com"]).unwrap();

    assert_eq!(backend.accounts().check(&email).unwrap(), None);
    assert_eq!(backend.accounts().check_keypair(&email).unwrap(), None);
    assert_eq!(
        backend
            .accounts()
            .set_keypair(&email, &Keypair::from_pem("K1"))
            .unwrap(),
        None
    );
    assert_eq!(
        backend
            .accounts()
            .set(&email, &AccountUpdate::default())
            .unwrap(),
        None
    );
    assert_eq!(backend.certificates().check(&domains).unwrap(), None);
    assert_eq!(
        backend
            .certificates()
            .set(&domains, &CertificateUpdate::pems("C", "K", "CH"))
            .unwrap(),
        None
    );
}

#[test]
fn closed_store_degrades_and_refuses_to_reopen() {
    let backend = Backend::create(StoreOptions::in_memory()).unwrap();
    let email = RecordQuery::by_email("a@x.com").unwrap();
    backend
        .accounts()
        .set_keypair(&email, &Keypair::from_pem("K1"))
        .unwrap()
        .unwrap();

    backend.close().unwrap();
    assert_eq!(backend.accounts().check_keypair(&email).unwrap(), None);
    assert!(matches!(backend.store().open(), Err(DbError::Closed)));
}

#[test]
fn concurrent_open_runs_setup_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(file_options(&dir.path().join("store.sqlite3"))).unwrap());

    thread::scope(|scope| {
        for _ in 0..8 {
            let store = Arc::clone(&store);
            scope.spawn(move || store.open().unwrap());
        }
    });

    assert!(store.is_open());
    assert_eq!(store.setup_count(), 1);
}

#[test]
fn concurrent_upserts_for_one_email_create_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    let backend = Backend::create(file_options(&path)).unwrap();
    let query = RecordQuery::by_email("race@x.com").unwrap();

    let ids = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let backend = &backend;
                let query = &query;
                scope.spawn(move || {
                    let mut extra = serde_json::Map::new();
                    extra.insert("worker".to_string(), serde_json::json!(worker));
                    backend
                        .accounts()
                        .set(
                            query,
                            &AccountUpdate {
                                agree_tos: Some(serde_json::json!(true)),
                                extra,
                                ..AccountUpdate::default()
                            },
                        )
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let first = &ids[0];
    assert!(ids
        .iter()
        .all(|account| account.id == first.id && account.created == first.created));
    assert_eq!(count_documents(&path, "accounts"), 1);
}

#[test]
fn records_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    let query = RecordQuery::by_domains(&["example.com", "www.example.com"]).unwrap();

    let stored = {
        let backend = Backend::create(file_options(&path)).unwrap();
        let stored = backend
            .certificates()
            .set(&query, &CertificateUpdate::pems("C1", "K1", "CH1"))
            .unwrap()
            .unwrap();
        backend.close().unwrap();
        stored
    };

    let backend = Backend::create(file_options(&path)).unwrap();
    let found = backend
        .certificates()
        .check(&RecordQuery::by_domains(&["www.example.com"]).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(found.id, stored.id);
    assert_eq!(found.created, stored.created);
    assert_eq!(found.cert.as_deref(), Some("C1"));
}

#[test]
fn index_setup_failures_are_reported_together() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    {
        let conn = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        conn.execute_batch("CREATE TABLE idx_documents_field_cert (blocker INTEGER);")
            .unwrap();
    }

    let err = match Backend::create(file_options(&path)) {
        Ok(_) => panic!("index setup should fail"),
        Err(err) => err,
    };
    match err {
        ServiceError::Setup(DbError::IndexSetup(failures)) => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|failure| failure.field == "cert"));
            let collections: Vec<&str> = failures
                .iter()
                .map(|failure| failure.collection.as_str())
                .collect();
            assert_eq!(collections, vec!["accounts", "certificates"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_options_are_rejected_before_connecting() {
    let err = match Backend::create(StoreOptions {
        accounts_coll_name: "certificates".to_string(),
        ..StoreOptions::in_memory()
    }) {
        Ok(_) => panic!("duplicate collections should be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, ServiceError::Config(_)));
}
