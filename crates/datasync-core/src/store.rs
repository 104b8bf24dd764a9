//! Local document store
//!
//! A [`LocalStore`] is one handle onto a shared [`Backend`]. It persists
//! documents in per-type index tables plus blob files, keeps a private
//! [`ObjectCache`], and keeps that cache coherent with every other handle of
//! the same backend through the backend's change hub.
//!
//! ## Consistency
//!
//! Writes run under the backend's exclusive lock and inside one index
//! transaction. The new blob is staged first, the row is written, then the
//! blob is committed (renamed into place) and only then the transaction.
//! A crash can therefore leave an unreferenced blob behind, but never a row
//! that points at a missing or stale file.
//!
//! ## Notifications
//!
//! After a commit the handle publishes the change on the hub and raises its
//! own [`StoreEvent`] right away. Other handles queue the change in their
//! inbox and apply it the next time they run an operation or call
//! [`LocalStore::process_events`].
//!
//! ## Usage
//!
//! ```ignore
//! let backend = Backend::open(&Config::load()?)?;
//! let mut store = LocalStore::new(backend.clone());
//!
//! store.save(&ObjectKey::new("User", "alice"), &doc)?;
//! let doc = store.load(&ObjectKey::new("User", "alice"))?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cache::ObjectCache;
use crate::hub::{Change, HandleId, HubEvent, StoreEvent};
use crate::key::{Document, ObjectKey};
use crate::storage::blobs::{remove_dir_all_if_exists, BlobDir};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{self, managed_tables, table_name, type_name_from_table};

/// One handle onto a shared local store
#[derive(Debug)]
pub struct LocalStore {
    backend: Arc<Backend>,
    id: HandleId,
    /// Changes published by any handle of the backend
    inbox: mpsc::UnboundedReceiver<HubEvent>,
    /// Local event subscribers
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
    /// Type identifier -> table name, only for tables known to exist
    table_names: HashMap<Vec<u8>, String>,
    cache: ObjectCache,
    /// Abort `save` between blob commit and index commit
    #[cfg(test)]
    crash_before_index_commit: bool,
}

impl LocalStore {
    /// Attach a new handle to a backend
    pub fn new(backend: Arc<Backend>) -> Self {
        let (id, inbox) = backend.hub().subscribe();
        let cache = ObjectCache::new(backend.default_cache_size());
        Self {
            backend,
            id,
            inbox,
            subscribers: Vec::new(),
            table_names: HashMap::new(),
            cache,
            #[cfg(test)]
            crash_before_index_commit: false,
        }
    }

    /// This handle's identity on the change hub
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The backend this handle is attached to
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Subscribe to this handle's change events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Apply changes committed by other handles
    ///
    /// Every operation does this on its own. A handle that sits idle while
    /// others write keeps every change, document included, in its inbox
    /// until it runs an operation or this method, so owners of long-lived
    /// idle handles must call it regularly. Returns the number of foreign
    /// changes applied.
    pub fn process_events(&mut self) -> usize {
        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox()
    }

    // ==================== Reads ====================

    /// Number of stored documents of a type
    pub fn count(&mut self, type_name: impl AsRef<[u8]>) -> StoreResult<u64> {
        let type_name = type_name.as_ref();
        let key = ObjectKey::for_type(type_name);

        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();
        let conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, &key)? else {
            return Ok(0);
        };

        let sql = format!("SELECT Count(*) FROM {table}");
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| StoreError::sql(Some(&key), sql, e))?;
        Ok(count as u64)
    }

    /// Ids of all stored documents of a type
    pub fn keys(&mut self, type_name: impl AsRef<[u8]>) -> StoreResult<Vec<String>> {
        let type_name = type_name.as_ref();
        let key = ObjectKey::for_type(type_name);

        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();
        let conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, &key)? else {
            return Ok(Vec::new());
        };

        let sql = format!("SELECT Key FROM {table} ORDER BY Key");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::sql(Some(&key), &sql, e))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| StoreError::sql(Some(&key), &sql, e))?;
        Ok(ids)
    }

    /// Load every stored document of a type
    ///
    /// All loaded documents are put into the cache.
    pub fn load_all(&mut self, type_name: impl AsRef<[u8]>) -> StoreResult<Vec<Document>> {
        let type_name = type_name.as_ref();
        let key = ObjectKey::for_type(type_name);

        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();
        let conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, &key)? else {
            return Ok(Vec::new());
        };

        let sql = format!("SELECT Key, File FROM {table} ORDER BY Key");
        let rows = query_files(&conn, &sql, [], &key)?;
        self.read_documents(&BlobDir::locate(&backend.store_dir(), &table), type_name, rows)
    }

    /// Load one document
    ///
    /// Served from the cache when possible. Fails with
    /// [`StoreError::NotFound`] if nothing is stored for the key.
    pub fn load(&mut self, key: &ObjectKey) -> StoreResult<Document> {
        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();

        if let Some(doc) = self.cache.get(key) {
            debug!(key = %key, "Cache hit");
            return Ok(doc.clone());
        }

        let conn = backend.connection();
        let Some(table) = self.resolve_table(&conn, key)? else {
            return Err(StoreError::NotFound { key: key.clone() });
        };

        let sql = format!("SELECT File FROM {table} WHERE Key = ?");
        let file_ref: Option<String> = conn
            .query_row(&sql, params![key.id], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::sql(Some(key), &sql, e))?;
        let Some(file_ref) = file_ref else {
            return Err(StoreError::NotFound { key: key.clone() });
        };

        let dir = BlobDir::locate(&backend.store_dir(), &table);
        let (doc, size) = dir.read(&file_ref, key)?;
        self.cache.insert(key.clone(), doc.clone(), size);
        Ok(doc)
    }

    /// Find documents of a type whose id matches a glob pattern
    ///
    /// `*` matches any run of characters and `?` exactly one. Matching is
    /// case-sensitive and applies to ids only. Hits are put into the cache.
    pub fn find(
        &mut self,
        type_name: impl AsRef<[u8]>,
        pattern: &str,
    ) -> StoreResult<Vec<Document>> {
        let type_name = type_name.as_ref();
        let key = ObjectKey::for_type(type_name);

        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();
        let conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, &key)? else {
            return Ok(Vec::new());
        };

        let sql = format!("SELECT Key, File FROM {table} WHERE Key GLOB ? ORDER BY Key");
        let rows = query_files(&conn, &sql, [glob_pattern(pattern)], &key)?;
        self.read_documents(&BlobDir::locate(&backend.store_dir(), &table), type_name, rows)
    }

    /// Type identifiers that currently have stored data
    pub fn types(&mut self) -> StoreResult<Vec<Vec<u8>>> {
        let backend = Arc::clone(&self.backend);
        let _guard = backend.read_lock();
        self.drain_inbox();
        let conn = backend.connection();

        Ok(managed_tables(&conn)?
            .iter()
            .filter_map(|table| type_name_from_table(table))
            .collect())
    }

    // ==================== Writes ====================

    /// Store a document, creating or replacing it
    ///
    /// The first save of a key creates its record with version 1, every
    /// further save bumps the version by one.
    ///
    /// Once the index commit succeeds the save succeeds. Deleting the
    /// replaced blob happens afterwards; if that fails the old file stays
    /// behind as an orphan and the failure is only logged.
    pub fn save(&mut self, key: &ObjectKey, doc: &Document) -> StoreResult<()> {
        let backend = Arc::clone(&self.backend);
        let guard = backend.write_lock();
        self.drain_inbox();
        let mut conn = backend.connection();

        let table = self.ensure_table(&conn, key)?;
        let dir = BlobDir::create(&backend.store_dir(), &table, key)?;
        let crash_before_index_commit = self.crash_before_index_commit();

        let (previous, size) = in_transaction(&mut conn, Some(key), |tx| {
            let select = format!("SELECT File FROM {table} WHERE Key = ?");
            let previous: Option<String> = tx
                .query_row(&select, params![key.id], |row| row.get(0))
                .optional()
                .map_err(|e| StoreError::sql(Some(key), &select, e))?;

            let staged = dir.stage(key, doc)?;

            let (sql, action) = match previous {
                Some(_) => (
                    format!(
                        "UPDATE {table} SET File = ?1, Checksum = ?2, Version = Version + 1 WHERE Key = ?3"
                    ),
                    "update",
                ),
                None => (
                    format!("INSERT INTO {table} (File, Checksum, Key) VALUES (?1, ?2, ?3)"),
                    "insert",
                ),
            };
            tx.execute(&sql, params![staged.file_ref(), staged.checksum(), key.id])
                .map_err(|e| StoreError::sql(Some(key), &sql, e))?;
            debug!(key = %key, file_ref = staged.file_ref(), "Index row {}", action);

            let size = staged.size();
            staged.commit(&dir, key)?;

            if crash_before_index_commit {
                return Err(StoreError::persistence(
                    Some(key),
                    "COMMIT",
                    "simulated crash before index commit",
                ));
            }
            Ok((previous, size))
        })?;
        drop(conn);

        if let Some(previous) = previous {
            if let Err(e) = dir.remove_blob(&previous) {
                warn!(key = %key, file_ref = %previous, "Could not remove replaced blob, leaving orphan: {}", e);
            }
        }

        self.cache.insert(key.clone(), doc.clone(), size);
        backend.hub().publish(
            self.id,
            Change::Document {
                key: key.clone(),
                document: Some(doc.clone()),
                size,
            },
        );
        drop(guard);

        debug!(key = %key, size, "Saved document");
        self.emit(StoreEvent::Changed {
            key: key.clone(),
            deleted: false,
        });
        Ok(())
    }

    /// Delete a document
    ///
    /// Returns `false` if nothing was stored for the key. The blob is deleted
    /// after the index commit; if that fails it stays behind as an orphan and
    /// the failure is only logged.
    pub fn remove(&mut self, key: &ObjectKey) -> StoreResult<bool> {
        let backend = Arc::clone(&self.backend);
        let guard = backend.write_lock();
        self.drain_inbox();
        let mut conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, key)? else {
            return Ok(false);
        };

        let removed = in_transaction(&mut conn, Some(key), |tx| {
            let select = format!("SELECT File FROM {table} WHERE Key = ?");
            let file_ref: Option<String> = tx
                .query_row(&select, params![key.id], |row| row.get(0))
                .optional()
                .map_err(|e| StoreError::sql(Some(key), &select, e))?;

            if file_ref.is_some() {
                let delete = format!("DELETE FROM {table} WHERE Key = ?");
                tx.execute(&delete, params![key.id])
                    .map_err(|e| StoreError::sql(Some(key), &delete, e))?;
            }
            Ok(file_ref)
        })?;
        drop(conn);

        let Some(file_ref) = removed else {
            return Ok(false);
        };

        let dir = BlobDir::locate(&backend.store_dir(), &table);
        if let Err(e) = dir.remove_blob(&file_ref) {
            warn!(key = %key, file_ref = %file_ref, "Could not remove blob of deleted record, leaving orphan: {}", e);
        }

        self.cache.remove(key);
        backend.hub().publish(
            self.id,
            Change::Document {
                key: key.clone(),
                document: None,
                size: 0,
            },
        );
        drop(guard);

        debug!(key = %key, "Removed document");
        self.emit(StoreEvent::Changed {
            key: key.clone(),
            deleted: true,
        });
        Ok(true)
    }

    /// Drop all documents of a type
    ///
    /// The table is dropped and committed first; a failure to delete the
    /// blob directory afterwards is returned, but the clear stands.
    pub fn clear(&mut self, type_name: impl AsRef<[u8]>) -> StoreResult<()> {
        let type_name = type_name.as_ref();
        let key = ObjectKey::for_type(type_name);

        let backend = Arc::clone(&self.backend);
        let guard = backend.write_lock();
        self.drain_inbox();
        let mut conn = backend.connection();

        let Some(table) = self.resolve_table(&conn, &key)? else {
            return Ok(());
        };

        in_transaction(&mut conn, Some(&key), |tx| {
            let sql = format!("DROP TABLE {table}");
            tx.execute_batch(&sql)
                .map_err(|e| StoreError::sql(Some(&key), sql, e))
        })?;
        drop(conn);

        self.table_names.remove(type_name);
        self.cache.remove_type(type_name);

        let dir = BlobDir::locate(&backend.store_dir(), &table);
        let removal = dir
            .remove_all()
            .map_err(|e| StoreError::io(Some(&key), dir.path(), e));

        backend.hub().publish(
            self.id,
            Change::TypeCleared {
                type_name: type_name.to_vec(),
            },
        );
        drop(guard);

        info!(type_name = %key.type_display(), "Cleared type");
        self.emit(StoreEvent::TypeCleared {
            type_name: type_name.to_vec(),
        });
        removal
    }

    /// Drop every managed table and the whole blob directory tree
    ///
    /// Table drops are one transaction. Removing the blob tree happens after
    /// that commit and is not rolled back if it fails part way; the error is
    /// returned with the store already empty.
    pub fn reset(&mut self) -> StoreResult<()> {
        let backend = Arc::clone(&self.backend);
        let guard = backend.write_lock();
        self.drain_inbox();
        let mut conn = backend.connection();

        let dropped = in_transaction(&mut conn, None, |tx| {
            let tables = managed_tables(tx)?;
            for table in &tables {
                let sql = format!("DROP TABLE {table}");
                tx.execute_batch(&sql)
                    .map_err(|e| StoreError::sql(None, sql, e))?;
            }
            Ok(tables.len())
        })?;
        drop(conn);

        self.table_names.clear();
        self.cache.clear();

        let store_dir = backend.store_dir();
        let removal =
            remove_dir_all_if_exists(&store_dir).map_err(|e| StoreError::io(None, &store_dir, e));

        backend.hub().publish(self.id, Change::Reset);
        drop(guard);

        info!(tables = dropped, "Reset local store");
        self.emit(StoreEvent::Reset);
        removal
    }

    // ==================== Cache ====================

    /// Current cache capacity in bytes
    pub fn cache_capacity(&self) -> u64 {
        self.cache.capacity()
    }

    /// Change the cache capacity, evicting entries if needed
    pub fn set_cache_capacity(&mut self, capacity: u64) {
        self.cache.set_capacity(capacity);
    }

    /// Restore the configured default cache capacity
    pub fn reset_cache_capacity(&mut self) {
        self.cache.reset_capacity();
    }

    /// Whether a document is currently cached by this handle
    pub fn is_cached(&self, key: &ObjectKey) -> bool {
        self.cache.contains(key)
    }

    // ==================== Internals ====================

    /// Table of a type if it exists; never creates anything
    fn resolve_table(&mut self, conn: &Connection, key: &ObjectKey) -> StoreResult<Option<String>> {
        if let Some(table) = self.table_names.get(&key.type_name) {
            return Ok(Some(table.clone()));
        }

        let table = table_name(&key.type_name);
        if !schema::table_exists(conn, &table, key)? {
            return Ok(None);
        }
        self.table_names.insert(key.type_name.clone(), table.clone());
        Ok(Some(table))
    }

    /// Table of a type, created if it does not exist yet
    fn ensure_table(&mut self, conn: &Connection, key: &ObjectKey) -> StoreResult<String> {
        if let Some(table) = self.resolve_table(conn, key)? {
            return Ok(table);
        }

        let table = table_name(&key.type_name);
        schema::create_table(conn, &table, key)?;
        debug!(type_name = %key.type_display(), table = %table, "Created type table");
        self.table_names.insert(key.type_name.clone(), table.clone());
        Ok(table)
    }

    /// Read the blobs for `(id, file)` rows and cache the documents
    fn read_documents(
        &mut self,
        dir: &BlobDir,
        type_name: &[u8],
        rows: Vec<(String, String)>,
    ) -> StoreResult<Vec<Document>> {
        let mut docs = Vec::with_capacity(rows.len());
        for (id, file_ref) in rows {
            let key = ObjectKey::new(type_name, id);
            let (doc, size) = dir.read(&file_ref, &key)?;
            self.cache.insert(key, doc.clone(), size);
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Apply queued foreign changes; own changes were applied at commit time
    fn drain_inbox(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox.try_recv() {
            if event.origin == self.id {
                continue;
            }
            debug!(handle = %self.id, origin = %event.origin, "Applying foreign change");
            self.apply_foreign(&event.change);
            self.emit(StoreEvent::from(&event.change));
            applied += 1;
        }
        applied
    }

    fn apply_foreign(&mut self, change: &Change) {
        match change {
            // Only refresh entries this handle already holds
            Change::Document {
                key,
                document,
                size,
            } => {
                if self.cache.contains(key) {
                    match document {
                        Some(doc) => self.cache.insert(key.clone(), doc.clone(), *size),
                        None => {
                            self.cache.remove(key);
                        }
                    }
                }
            }
            Change::TypeCleared { type_name } => {
                self.table_names.remove(type_name);
                self.cache.remove_type(type_name);
            }
            Change::Reset => {
                self.table_names.clear();
                self.cache.clear();
            }
        }
    }

    /// Raise a local event, dropping subscribers that went away
    fn emit(&mut self, event: StoreEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn crash_before_index_commit(&self) -> bool {
        self.crash_before_index_commit
    }

    #[cfg(not(test))]
    fn crash_before_index_commit(&self) -> bool {
        false
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        self.backend.hub().unsubscribe(self.id);
    }
}

/// Run `body` in a transaction, committing on success and rolling back on error
fn in_transaction<T>(
    conn: &mut Connection,
    key: Option<&ObjectKey>,
    body: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::sql(key, "BEGIN TRANSACTION", e))?;

    match body(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|e| StoreError::sql(key, "COMMIT", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback() {
                warn!("Rollback failed: {}", e);
            }
            Err(err)
        }
    }
}

/// Collect `(id, file)` pairs from a two-column query
fn query_files(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    key: &ObjectKey,
) -> StoreResult<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StoreError::sql(Some(key), sql, e))?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::sql(Some(key), sql, e))?;
    Ok(rows)
}

/// Turn a `*`/`?` pattern into an SQLite GLOB operand
///
/// GLOB shares both wildcards; only `[` opens a character class there and
/// has to be matched literally.
fn glob_pattern(pattern: &str) -> String {
    pattern.replace('[', "[[]")
}
