//! Record store handle and its initialization lifecycle.
//!
//! # Responsibility
//! - Own the single SQLite connection shared by both record collections.
//! - Run connection bootstrap and index setup exactly once.
//! - Release the connection on `close`.
//!
//! # Invariants
//! - Concurrent `open` callers observe one setup sequence and its outcome.
//! - A failed setup leaves the store unopened; a later `open` retries on the
//!   same adopted connection, if one was given.
//! - `close` is terminal: after it, operations see `DbError::Unavailable`
//!   and `open` reports `DbError::Closed`.

use crate::config::{ConfigError, StoreOptions};
use crate::db::collection::ensure_index_on;
use crate::db::{
    bootstrap_connection, open_db, open_db_in_memory, DbError, DbResult, IndexFailure,
    SqliteCollection,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Fields indexed on both collections during setup.
pub const INDEXED_FIELDS: [&str; 5] = ["privkey", "cert", "domains", "email", "accountId"];

pub struct Store {
    options: StoreOptions,
    handle: OnceCell<Mutex<Option<Connection>>>,
    adopted: Mutex<Option<Connection>>,
    setup_runs: AtomicUsize,
}

impl Store {
    /// Creates an unopened store. No connection is made until `open`.
    pub fn new(options: StoreOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            options,
            handle: OnceCell::new(),
            adopted: Mutex::new(None),
            setup_runs: AtomicUsize::new(0),
        })
    }

    /// Creates an unopened store that will adopt `conn` instead of
    /// connecting to `options.database`.
    pub fn with_connection(conn: Connection, options: StoreOptions) -> Result<Self, ConfigError> {
        let mut store = Self::new(options)?;
        store.adopted = Mutex::new(Some(conn));
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Connects, migrates and creates indexes. Idempotent once it succeeds.
    ///
    /// # Errors
    /// - Connection, migration and index failures are returned unchanged.
    /// - Returns `DbError::Closed` after `close`.
    pub fn open(&self) -> DbResult<()> {
        let cell = self
            .handle
            .get_or_try_init(|| self.connect_and_setup().map(|conn| Mutex::new(Some(conn))))?;
        let guard = cell.lock().map_err(|_| DbError::LockPoisoned)?;
        if guard.is_none() {
            return Err(DbError::Closed);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle
            .get()
            .and_then(|cell| cell.lock().ok().map(|guard| guard.is_some()))
            .unwrap_or(false)
    }

    /// Closes the connection. Closing an unopened store prevents later opens.
    pub fn close(&self) -> DbResult<()> {
        let cell = self.handle.get_or_init(|| Mutex::new(None));
        let conn = cell.lock().map_err(|_| DbError::LockPoisoned)?.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, err)| DbError::Sqlite(err))?;
            info!("event=store_close module=store status=ok");
        }
        Ok(())
    }

    /// Number of setup sequences that ran to completion.
    pub fn setup_count(&self) -> usize {
        self.setup_runs.load(Ordering::SeqCst)
    }

    pub fn accounts(self: &Arc<Self>) -> DbResult<SqliteCollection> {
        SqliteCollection::new(Arc::clone(self), self.options.accounts_coll_name.clone())
    }

    pub fn certificates(self: &Arc<Self>) -> DbResult<SqliteCollection> {
        SqliteCollection::new(Arc::clone(self), self.options.certs_coll_name.clone())
    }

    /// Runs `f` against the open connection.
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> DbResult<R>,
    ) -> DbResult<R> {
        let cell = self.handle.get().ok_or(DbError::Unavailable)?;
        let mut guard = cell.lock().map_err(|_| DbError::LockPoisoned)?;
        let conn = guard.as_mut().ok_or(DbError::Unavailable)?;
        f(conn)
    }

    fn connect_and_setup(&self) -> DbResult<Connection> {
        let started_at = Instant::now();
        info!(
            "event=store_open module=store status=start in_memory={}",
            self.options.is_in_memory()
        );

        let result = match self.take_adopted()? {
            Some(mut conn) => match self.setup_adopted(&mut conn) {
                Ok(()) => Ok(conn),
                Err(err) => {
                    self.readopt(conn)?;
                    Err(err)
                }
            },
            None => self.connect().and_then(|mut conn| {
                self.ensure_indexes(&mut conn)?;
                Ok(conn)
            }),
        };

        match &result {
            Ok(_) => {
                self.setup_runs.fetch_add(1, Ordering::SeqCst);
                info!(
                    "event=store_open module=store status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => error!(
                "event=store_open module=store status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn take_adopted(&self) -> DbResult<Option<Connection>> {
        Ok(self
            .adopted
            .lock()
            .map_err(|_| DbError::LockPoisoned)?
            .take())
    }

    fn readopt(&self, conn: Connection) -> DbResult<()> {
        *self.adopted.lock().map_err(|_| DbError::LockPoisoned)? = Some(conn);
        Ok(())
    }

    fn setup_adopted(&self, conn: &mut Connection) -> DbResult<()> {
        bootstrap_connection(conn, self.options.busy_timeout())?;
        self.ensure_indexes(conn)
    }

    fn connect(&self) -> DbResult<Connection> {
        if self.options.is_in_memory() {
            open_db_in_memory()
        } else {
            open_db(self.options.database.trim(), self.options.busy_timeout())
        }
    }

    /// Attempts every index, then reports all failures together.
    fn ensure_indexes(&self, conn: &mut Connection) -> DbResult<()> {
        let mut failures = Vec::new();
        for collection in [
            &self.options.accounts_coll_name,
            &self.options.certs_coll_name,
        ] {
            for field in INDEXED_FIELDS {
                if let Err(err) = ensure_index_on(conn, collection, field) {
                    error!(
                        "event=index_ensure module=store status=error collection={} field={} error={}",
                        collection, field, err
                    );
                    failures.push(IndexFailure {
                        collection: collection.clone(),
                        field: field.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DbError::IndexSetup(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Store, INDEXED_FIELDS};
    use crate::config::StoreOptions;
    use crate::db::DbError;
    use rusqlite::Connection;

    fn index_rows(store: &Store) -> i64 {
        store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM collection_indexes;", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap()
    }

    #[test]
    fn open_registers_indexes_on_both_collections() {
        let store = Store::new(StoreOptions::in_memory()).unwrap();
        store.open().unwrap();
        store.open().unwrap();

        assert!(store.is_open());
        assert_eq!(store.setup_count(), 1);
        assert_eq!(index_rows(&store), (INDEXED_FIELDS.len() * 2) as i64);
    }

    #[test]
    fn adopted_connection_is_bootstrapped() {
        let conn = Connection::open_in_memory().unwrap();
        let store = Store::with_connection(conn, StoreOptions::in_memory()).unwrap();
        store.open().unwrap();

        let version: u32 = store
            .with_conn(|conn| Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(version, crate::db::migrations::latest_version());
    }

    #[test]
    fn failed_setup_keeps_the_adopted_connection() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.sqlite3");
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE idx_documents_field_cert (x INTEGER);")
            .unwrap();
        let store =
            Store::with_connection(conn, StoreOptions::file(fallback.to_str().unwrap())).unwrap();

        for _ in 0..2 {
            assert!(matches!(store.open(), Err(DbError::IndexSetup(_))));
        }
        assert!(!store.is_open());
        assert!(!fallback.exists());

        let blocker: i64 = store
            .adopted
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'idx_documents_field_cert';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(blocker, 1);
    }

    #[test]
    fn unopened_and_closed_stores_are_unavailable() {
        let store = Store::new(StoreOptions::in_memory()).unwrap();
        assert!(matches!(
            store.with_conn(|_| Ok(())),
            Err(DbError::Unavailable)
        ));

        store.open().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(
            store.with_conn(|_| Ok(())),
            Err(DbError::Unavailable)
        ));
        assert!(matches!(store.open(), Err(DbError::Closed)));
    }
}
