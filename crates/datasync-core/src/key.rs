//! Object identity
//!
//! Every stored document is addressed by an [`ObjectKey`]: the type
//! identifier (an opaque byte string, usually a type name) plus the
//! instance id within that type.

use std::fmt;

/// Opaque structured payload stored by the local store
///
/// Keys are kept in sorted order, which makes the serialized form canonical.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Composite identity of one stored document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Type identifier
    pub type_name: Vec<u8>,
    /// Instance id, unique within its type
    pub id: String,
}

impl ObjectKey {
    /// Create a key from a type identifier and an id
    pub fn new(type_name: impl Into<Vec<u8>>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Key that names a whole type rather than a single document
    ///
    /// Used as error context for per-type operations such as `count` or `clear`.
    pub fn for_type(type_name: impl Into<Vec<u8>>) -> Self {
        Self::new(type_name, String::new())
    }

    /// The type identifier rendered for humans
    pub fn type_display(&self) -> String {
        String::from_utf8_lossy(&self.type_name).into_owned()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.type_display())
        } else {
            write!(f, "{}:{}", self.type_display(), self.id)
        }
    }
}
