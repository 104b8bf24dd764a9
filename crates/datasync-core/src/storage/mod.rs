//! Storage layer
//!
//! Index tables in SQLite plus one blob file per document.
//!
//! ## Layout
//!
//! - **Index**: one `data_*` table per document type, mapping each id to
//!   its blob file, content checksum and version
//! - **Blobs**: `<storage root>/store/<table>/<file>.dat`, canonical CBOR
//!
//! The [`LocalStore`](crate::LocalStore) decides the order in which both
//! sides are written; this module only provides the pieces.

pub mod blobs;
pub mod error;
pub mod schema;

pub use blobs::{BlobDir, StagedBlob};
pub use error::{StoreError, StoreResult};
pub use schema::{table_name, type_name_from_table, TABLE_PREFIX};
