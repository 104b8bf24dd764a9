//! Storage error handling
//!
//! Every failure of the local store is one of three kinds: the requested
//! document does not exist, the index or the filesystem refused an
//! operation, or a stored blob could not be decoded.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::key::ObjectKey;

/// Errors that can occur during local store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the requested key
    #[error("No data stored for '{key}'")]
    NotFound { key: ObjectKey },

    /// A statement, transaction, file or directory operation failed
    #[error("Persistence failure{} in '{context}': {message}", describe_key(.key))]
    Persistence {
        key: Option<ObjectKey>,
        context: String,
        message: String,
    },

    /// A blob did not decode into a well-formed document
    #[error("Data for '{key}' at '{path}' is corrupted: {details}")]
    CorruptData {
        key: ObjectKey,
        path: PathBuf,
        details: String,
    },
}

fn describe_key(key: &Option<ObjectKey>) -> String {
    match key {
        Some(key) => format!(" for '{}'", key),
        None => String::new(),
    }
}

impl StoreError {
    /// Wrap a failed SQL statement or transaction call
    ///
    /// `context` is the statement text or the transaction step.
    pub fn sql(key: Option<&ObjectKey>, context: impl Into<String>, error: rusqlite::Error) -> Self {
        StoreError::Persistence {
            key: key.cloned(),
            context: context.into(),
            message: error.to_string(),
        }
    }

    /// Wrap a failed filesystem call with the path it touched
    pub fn io(key: Option<&ObjectKey>, path: &Path, error: io::Error) -> Self {
        let message = match error.kind() {
            io::ErrorKind::PermissionDenied => format!("permission denied ({})", error),
            _ if is_disk_full_error(&error) => format!("disk full ({})", error),
            _ => error.to_string(),
        };
        StoreError::Persistence {
            key: key.cloned(),
            context: path.display().to_string(),
            message,
        }
    }

    /// Persistence failure without an underlying engine error
    pub fn persistence(
        key: Option<&ObjectKey>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Persistence {
            key: key.cloned(),
            context: context.into(),
            message: message.into(),
        }
    }

    /// The key this error refers to, if any
    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            StoreError::NotFound { key } | StoreError::CorruptData { key, .. } => Some(key),
            StoreError::Persistence { key, .. } => key.as_ref(),
        }
    }

    /// Whether this is a missing-record error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for local store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::NotFound {
            key: ObjectKey::new("User", "alice"),
        };

        assert!(err.is_not_found());
        assert_eq!(err.key(), Some(&ObjectKey::new("User", "alice")));
        assert!(err.to_string().contains("User:alice"));
    }

    #[test]
    fn test_io_classification() {
        let key = ObjectKey::new("User", "alice");
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StoreError::io(Some(&key), Path::new("/test/path"), io_err);

        let msg = err.to_string();
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("/test/path"));
        assert!(msg.contains("User:alice"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StoreError::io(None, Path::new("/full/disk"), io_err);

        assert!(err.to_string().contains("disk full"));
        assert!(err.key().is_none());
    }

    #[test]
    fn test_sql_error_carries_statement() {
        let err = StoreError::sql(
            None,
            "SELECT Count(*) FROM data_x",
            rusqlite::Error::InvalidQuery,
        );

        match err {
            StoreError::Persistence { key, context, .. } => {
                assert!(key.is_none());
                assert_eq!(context, "SELECT Count(*) FROM data_x");
            }
            _ => panic!("Expected persistence error"),
        }
    }

    #[test]
    fn test_corrupt_data_display() {
        let err = StoreError::CorruptData {
            key: ObjectKey::new("User", "alice"),
            path: PathBuf::from("/data/store/data_User/abc.dat"),
            details: "unexpected end of input".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("corrupted"));
        assert!(msg.contains("abc.dat"));
    }
}
