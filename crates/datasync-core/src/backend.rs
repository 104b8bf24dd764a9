//! Shared backing store
//!
//! A [`Backend`] bundles everything that must exist exactly once per store:
//! the SQLite connection holding the index tables, the storage root for the
//! blob directories, the reader/writer lock serializing access across all
//! handles, and the [`ChangeHub`] those handles talk through.
//!
//! It is created explicitly and shared as `Arc<Backend>`; every
//! [`LocalStore`](crate::LocalStore) built from the same `Arc` cooperates,
//! handles built from different backends never see each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rusqlite::Connection;
use tracing::debug;

use crate::config::Config;
use crate::hub::ChangeHub;
use crate::storage::error::{StoreError, StoreResult};

/// Name of the blob subdirectory below the storage root
pub const STORE_SUBDIR: &str = "store";

/// Connection, lock, hub and storage root shared by all handles of one store
#[derive(Debug)]
pub struct Backend {
    conn: Mutex<Connection>,
    lock: RwLock<()>,
    hub: ChangeHub,
    storage_root: PathBuf,
    default_cache_size: u64,
}

impl Backend {
    /// Open the store described by a configuration
    ///
    /// Creates the data directory and the index database if needed.
    pub fn open(config: &Config) -> StoreResult<Arc<Self>> {
        fs::create_dir_all(&config.data_dir)
            .map_err(|e| StoreError::io(None, &config.data_dir, e))?;

        let path = config.database_path();
        let conn = Connection::open(&path)
            .map_err(|e| StoreError::sql(None, path.display().to_string(), e))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreError::sql(None, "PRAGMA journal_mode = WAL", e))?;

        debug!("Opened index database at {:?}", path);
        Ok(Self::with_connection(
            conn,
            config.data_dir.clone(),
            config.cache_size,
        ))
    }

    /// Open a store with an in-memory index (for testing)
    ///
    /// Blobs are still written below `storage_root`.
    pub fn open_in_memory(
        storage_root: impl Into<PathBuf>,
        cache_size: u64,
    ) -> StoreResult<Arc<Self>> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::sql(None, ":memory:", e))?;
        Ok(Self::with_connection(conn, storage_root, cache_size))
    }

    /// Adopt an already opened connection
    pub fn with_connection(
        conn: Connection,
        storage_root: impl Into<PathBuf>,
        cache_size: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn: Mutex::new(conn),
            lock: RwLock::new(()),
            hub: ChangeHub::new(),
            storage_root: storage_root.into(),
            default_cache_size: cache_size,
        })
    }

    /// Storage root directory
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Root of the per-type blob directories
    pub fn store_dir(&self) -> PathBuf {
        self.storage_root.join(STORE_SUBDIR)
    }

    /// Cache capacity new handles start with
    pub fn default_cache_size(&self) -> u64 {
        self.default_cache_size
    }

    /// The change hub shared by all handles
    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Take the store lock in shared mode (reads)
    pub(crate) fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Take the store lock exclusively (writes)
    pub(crate) fn write_lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    /// Access the index connection
    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
