//! DataSync Core Library
//!
//! The local persistence engine of a document synchronization system: typed
//! JSON documents stored on the local file system, indexed in SQLite, cached
//! per handle and kept coherent across every handle sharing one store.
//!
//! # Architecture
//!
//! - **Index**: SQLite, one table per document type (id, blob file,
//!   checksum, version)
//! - **Blobs**: one canonical CBOR file per document, written atomically
//! - **Cache**: per-handle LRU bounded by serialized size
//! - **Hub**: per-store fan-out of committed changes to all handles
//!
//! # Quick Start
//!
//! ```text
//! let backend = Backend::open(&Config::load()?)?;
//! let mut store = LocalStore::new(backend);
//!
//! let key = ObjectKey::new("User", "alice");
//! store.save(&key, &doc)?;
//! assert_eq!(store.load(&key)?, doc);
//! ```
//!
//! # Modules
//!
//! - `store`: The document store handle (main entry point)
//! - `backend`: Shared connection, lock and hub of one store
//! - `storage`: Index tables, blob files and errors
//! - `cache`: Object cache
//! - `hub`: Change notifications between handles
//! - `config`: Configuration management
//! - `messages`: Protocol payloads

pub mod backend;
pub mod cache;
pub mod config;
pub mod hub;
pub mod key;
pub mod messages;
pub mod storage;
pub mod store;

pub use backend::Backend;
pub use cache::ObjectCache;
pub use config::Config;
pub use hub::{Change, ChangeHub, HandleId, HubEvent, StoreEvent};
pub use key::{Document, ObjectKey};
pub use messages::MacUpdateMessage;
pub use storage::{StoreError, StoreResult};
pub use store::LocalStore;
