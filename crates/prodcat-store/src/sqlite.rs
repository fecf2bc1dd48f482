//! SQLite-backed document collections for the cleaned corpus.
//!
//! Collections are rows of one `documents` table keyed by
//! `(collection, id)`. A cleaning run purges a collection and refills it, so
//! documents are replaced wholesale and never patched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::schema::SCHEMA_SQL;
use crate::settings::StoreSettings;
use prodcat_core::{CleanedDocument, Error, Result};

/// Document store over a single SQLite file.
pub struct CorpusStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

/// Document count of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCount {
    pub collection: String,
    pub documents: i64,
}

/// Health summary of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub db_path: PathBuf,
    pub size_bytes: u64,
    pub collections: Vec<CollectionCount>,
}

impl CorpusStore {
    /// Open (creating if absent) the database described by `settings`.
    pub fn connect(settings: &StoreSettings) -> Result<Self> {
        std::fs::create_dir_all(&settings.db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = settings.db_path();

        let conn = Self::create_connection(&db_path, settings.busy_timeout_ms)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        info!("CorpusStore connected: path={}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    fn create_connection(db_path: &Path, busy_timeout_ms: u64) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA cache_size = -65536;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    /// Release the connection.
    pub fn close(self) -> Result<()> {
        let path = self.db_path;
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| Error::Database(e.to_string()))?;
        debug!("CorpusStore closed: path={}", path.display());
        Ok(())
    }

    /// Connect, run `f`, and close the store on every exit path.
    ///
    /// An error from `f` takes precedence over an error while closing.
    pub fn scoped<T>(settings: &StoreSettings, f: impl FnOnce(&CorpusStore) -> Result<T>) -> Result<T> {
        let store = Self::connect(settings)?;
        let outcome = f(&store);
        let closed = store.close();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close store after error: {}", close_err);
                Err(e)
            }
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Collections
    // ---------------------------------------------------------------

    /// Delete every document of `collection`. Returns the number removed.
    pub fn purge(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM documents WHERE collection = ?1", params![collection])
            .map_err(|e| Error::Database(e.to_string()))?;
        info!("Purged {} documents from {}", removed, collection);
        Ok(removed)
    }

    /// Insert one document. A second insert of the same id is rejected.
    pub fn insert(&self, collection: &str, doc: &CleanedDocument) -> Result<()> {
        let conn = self.conn.lock();
        Self::insert_with(&conn, collection, doc)
    }

    fn insert_with(conn: &Connection, collection: &str, doc: &CleanedDocument) -> Result<()> {
        conn.prepare_cached(
            "INSERT INTO documents (collection, id, designation, description, image_binary, prdtypecode, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            collection,
            doc.id,
            doc.designation,
            doc.description,
            doc.image_binary,
            doc.prdtypecode,
            chrono::Utc::now().timestamp_millis(),
        ])
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                Error::DuplicateDocument {
                    collection: collection.to_string(),
                    id: doc.id,
                }
            } else {
                Error::Database(e.to_string())
            }
        })?;
        Ok(())
    }

    /// Purge `collection` and insert `docs` in one transaction.
    pub fn replace_all(&self, collection: &str, docs: &[CleanedDocument]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::Database(e.to_string()))?;
        let removed = tx
            .execute("DELETE FROM documents WHERE collection = ?1", params![collection])
            .map_err(|e| Error::Database(e.to_string()))?;
        for doc in docs {
            Self::insert_with(&tx, collection, doc)?;
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        info!(
            "Replaced {} with {} documents ({} removed)",
            collection,
            docs.len(),
            removed
        );
        Ok(docs.len())
    }

    /// All documents of `collection`, ordered by id.
    pub fn find_all(&self, collection: &str) -> Result<Vec<CleanedDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, designation, description, image_binary, prdtypecode
                 FROM documents WHERE collection = ?1 ORDER BY id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let docs = stmt
            .query_map(params![collection], Self::row_to_document)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(docs)
    }

    pub fn get(&self, collection: &str, id: i64) -> Result<Option<CleanedDocument>> {
        let conn = self.conn.lock();
        let doc = conn
            .prepare_cached(
                "SELECT id, designation, description, image_binary, prdtypecode
                 FROM documents WHERE collection = ?1 AND id = ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![collection, id], Self::row_to_document)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(doc)
    }

    /// Ids of every document in `collection`.
    pub fn ids(&self, collection: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let ids = stmt
            .query_map(params![collection], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(ids)
    }

    pub fn count(&self, collection: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Collection counts plus file size.
    pub fn status(&self) -> Result<StoreStatus> {
        let collections = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CollectionCount {
                        collection: row.get(0)?,
                        documents: row.get(1)?,
                    })
                })
                .map_err(|e| Error::Database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Database(e.to_string()))?;
            rows
        };

        let size_bytes = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStatus {
            db_path: self.db_path.clone(),
            size_bytes,
            collections,
        })
    }

    fn row_to_document(row: &Row<'_>) -> rusqlite::Result<CleanedDocument> {
        Ok(CleanedDocument {
            id: row.get(0)?,
            designation: row.get(1)?,
            description: row.get(2)?,
            image_binary: row.get(3)?,
            prdtypecode: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_settings(dir: &TempDir) -> StoreSettings {
        StoreSettings {
            db_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn test_store() -> (CorpusStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CorpusStore::connect(&test_settings(&dir)).unwrap();
        (store, dir)
    }

    fn doc(id: i64, code: Option<i64>) -> CleanedDocument {
        CleanedDocument {
            id,
            designation: format!("produit {}", id),
            description: "description".into(),
            image_binary: vec![0xFF, 0xD8, id as u8],
            prdtypecode: code,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (store, _dir) = test_store();
        store.insert("X_train_cleaned", &doc(2, Some(10))).unwrap();
        store.insert("X_train_cleaned", &doc(1, Some(40))).unwrap();
        store.insert("X_test_cleaned", &doc(1, None)).unwrap();

        let docs = store.find_all("X_train_cleaned").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, 1);
        assert_eq!(docs[0].prdtypecode, Some(40));
        assert_eq!(docs[1].image_binary, vec![0xFF, 0xD8, 2]);

        let test_doc = store.get("X_test_cleaned", 1).unwrap().unwrap();
        assert_eq!(test_doc.prdtypecode, None);
        assert!(store.get("X_test_cleaned", 9).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let (store, _dir) = test_store();
        store.insert("X_train_cleaned", &doc(7, Some(10))).unwrap();
        let err = store.insert("X_train_cleaned", &doc(7, Some(10))).unwrap_err();
        assert!(matches!(err, Error::DuplicateDocument { id: 7, .. }));
        assert_eq!(store.count("X_train_cleaned").unwrap(), 1);
    }

    #[test]
    fn test_purge_then_insert_is_idempotent() {
        let (store, _dir) = test_store();
        for _ in 0..2 {
            store.purge("X_train_cleaned").unwrap();
            for id in 0..3 {
                store.insert("X_train_cleaned", &doc(id, Some(10))).unwrap();
            }
        }
        assert_eq!(store.count("X_train_cleaned").unwrap(), 3);
        assert_eq!(store.ids("X_train_cleaned").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_purge_leaves_other_collections() {
        let (store, _dir) = test_store();
        store.insert("X_train_cleaned", &doc(1, Some(10))).unwrap();
        store.insert("X_test_cleaned", &doc(1, None)).unwrap();
        assert_eq!(store.purge("X_train_cleaned").unwrap(), 1);
        assert_eq!(store.count("X_train_cleaned").unwrap(), 0);
        assert_eq!(store.count("X_test_cleaned").unwrap(), 1);
    }

    #[test]
    fn test_replace_all_rolls_back_on_duplicate() {
        let (store, _dir) = test_store();
        store.insert("X_train_cleaned", &doc(1, Some(10))).unwrap();

        let batch = vec![doc(5, Some(10)), doc(5, Some(10))];
        assert!(store.replace_all("X_train_cleaned", &batch).is_err());
        assert_eq!(store.ids("X_train_cleaned").unwrap(), vec![1]);

        store.replace_all("X_train_cleaned", &[doc(3, Some(40))]).unwrap();
        assert_eq!(store.ids("X_train_cleaned").unwrap(), vec![3]);
    }

    #[test]
    fn test_scoped_closes_and_persists() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        CorpusStore::scoped(&settings, |store| store.insert("X_test_cleaned", &doc(4, None))).unwrap();

        let count = CorpusStore::scoped(&settings, |store| store.count("X_test_cleaned")).unwrap();
        assert_eq!(count, 1);

        let err = CorpusStore::scoped(&settings, |_| -> Result<()> {
            Err(Error::Internal("boom".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_status() {
        let (store, _dir) = test_store();
        store.insert("X_train_cleaned", &doc(1, Some(10))).unwrap();
        store.insert("X_train_cleaned", &doc(2, Some(10))).unwrap();
        store.insert("X_test_cleaned", &doc(1, None)).unwrap();

        let status = store.status().unwrap();
        assert_eq!(
            status.collections,
            vec![
                CollectionCount {
                    collection: "X_test_cleaned".into(),
                    documents: 1
                },
                CollectionCount {
                    collection: "X_train_cleaned".into(),
                    documents: 2
                },
            ]
        );
        assert_eq!(status.db_path, store.db_path());
    }
}
