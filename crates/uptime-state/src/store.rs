//! StateStore — redb-backed record persistence.
//!
//! Provides keyed CRUD over JSON records grouped into collections. Values
//! are JSON-serialized into redb's `&[u8]` value column under the composite
//! key `{collection}/{id}`. Each operation runs in its own transaction, so a
//! single record update is atomic and the last writer wins.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::Value;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::RECORDS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Keyed, collection-scoped persistence for records.
///
/// This is the contract the worker consumes; it never creates or deletes
/// checks itself, but other surfaces do.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    fn create(&self, collection: &str, id: &str, record: &Value) -> StateResult<()>;

    /// Fetch a record. Fails with `NotFound` if absent.
    fn read(&self, collection: &str, id: &str) -> StateResult<Value>;

    /// Replace an existing record. Fails with `NotFound` if absent.
    fn update(&self, collection: &str, id: &str, record: &Value) -> StateResult<()>;

    /// Remove a record. Fails with `NotFound` if absent.
    fn delete(&self, collection: &str, id: &str) -> StateResult<()>;

    /// Ids of every record in the collection, in key order.
    fn list(&self, collection: &str) -> StateResult<Vec<String>>;
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Write `record` under `key`, requiring the key to be present (`true`) or absent (`false`).
    fn write(&self, key: &str, record: &Value, must_exist: bool) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let exists = table.get(key).map_err(map_err!(Read))?.is_some();
            match (must_exist, exists) {
                (true, false) => return Err(StateError::NotFound(key.to_string())),
                (false, true) => return Err(StateError::AlreadyExists(key.to_string())),
                _ => {}
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl RecordStore for StateStore {
    fn create(&self, collection: &str, id: &str, record: &Value) -> StateResult<()> {
        let key = record_key(collection, id)?;
        self.write(&key, record, false)?;
        debug!(%key, "record created");
        Ok(())
    }

    fn read(&self, collection: &str, id: &str) -> StateResult<Value> {
        let key = record_key(collection, id)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Err(StateError::NotFound(key)),
        }
    }

    fn update(&self, collection: &str, id: &str, record: &Value) -> StateResult<()> {
        let key = record_key(collection, id)?;
        self.write(&key, record, true)
    }

    fn delete(&self, collection: &str, id: &str) -> StateResult<()> {
        let key = record_key(collection, id)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if !existed {
            return Err(StateError::NotFound(key));
        }
        debug!(%key, "record deleted");
        Ok(())
    }

    fn list(&self, collection: &str) -> StateResult<Vec<String>> {
        validate_segment(collection)?;
        let prefix = format!("{collection}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(id) = key.value().strip_prefix(&prefix) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

fn record_key(collection: &str, id: &str) -> StateResult<String> {
    validate_segment(collection)?;
    validate_segment(id)?;
    Ok(format!("{collection}/{id}"))
}

fn validate_segment(segment: &str) -> StateResult<()> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StateError::InvalidKey(segment.to_string()));
    }
    Ok(())
}
