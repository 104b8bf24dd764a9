//! Blob directories
//!
//! Each type table has a directory of the same name below `<root>/store`,
//! holding one `<file-ref>.dat` file per document with the canonical CBOR
//! encoding of that document.
//!
//! Writes never touch a visible file. New content is streamed into a hidden
//! staging file in the same directory while its SHA-256 checksum is computed,
//! and only [`StagedBlob::commit`] renames it to its final name. Dropping a
//! staged blob without committing removes the staging file.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use crate::key::{Document, ObjectKey};

/// File extension of committed blobs
pub const BLOB_EXTENSION: &str = "dat";

/// Directory holding the blobs of one type
#[derive(Debug, Clone)]
pub struct BlobDir {
    path: PathBuf,
}

impl BlobDir {
    /// Locate the directory for a table without touching the filesystem
    pub fn locate(store_dir: &Path, table: &str) -> Self {
        Self {
            path: store_dir.join(table),
        }
    }

    /// Locate the directory for a table, creating it if needed
    pub fn create(store_dir: &Path, table: &str, key: &ObjectKey) -> StoreResult<Self> {
        let dir = Self::locate(store_dir, table);
        fs::create_dir_all(&dir.path).map_err(|e| StoreError::io(Some(key), &dir.path, e))?;
        Ok(dir)
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the committed blob for a file reference
    pub fn blob_path(&self, file_ref: &str) -> PathBuf {
        self.path.join(format!("{}.{}", file_ref, BLOB_EXTENSION))
    }

    /// Serialize a document into a new staging file
    ///
    /// The staged blob gets a fresh, unique file reference. Nothing is visible
    /// under that reference until the blob is committed.
    pub fn stage(&self, key: &ObjectKey, doc: &Document) -> StoreResult<StagedBlob> {
        let mut file = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".tmp")
            .tempfile_in(&self.path)
            .map_err(|e| StoreError::io(Some(key), &self.path, e))?;
        let staging_path = file.path().to_path_buf();

        let (checksum, size) = {
            let mut writer = HashingWriter::new(BufWriter::new(file.as_file_mut()));
            ciborium::into_writer(doc, &mut writer).map_err(|e| match e {
                ciborium::ser::Error::Io(e) => StoreError::io(Some(key), &staging_path, e),
                ciborium::ser::Error::Value(msg) => {
                    StoreError::persistence(Some(key), staging_path.display().to_string(), msg)
                }
            })?;
            writer
                .finish()
                .map_err(|e| StoreError::io(Some(key), &staging_path, e))?
        };

        file.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(Some(key), &staging_path, e))?;

        let file_ref = uuid::Uuid::new_v4().simple().to_string();
        debug!(key = %key, staged = ?staging_path, file_ref = %file_ref, size, "Staged blob");

        Ok(StagedBlob {
            file,
            file_ref,
            checksum,
            size,
        })
    }

    /// Read and decode a committed blob
    ///
    /// Returns the document together with the blob size in bytes.
    pub fn read(&self, file_ref: &str, key: &ObjectKey) -> StoreResult<(Document, u64)> {
        let path = self.blob_path(file_ref);
        let bytes = fs::read(&path).map_err(|e| StoreError::io(Some(key), &path, e))?;

        let doc: Document =
            ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::CorruptData {
                key: key.clone(),
                path: path.clone(),
                details: e.to_string(),
            })?;

        Ok((doc, bytes.len() as u64))
    }

    /// Delete a committed blob
    pub fn remove_blob(&self, file_ref: &str) -> io::Result<()> {
        fs::remove_file(self.blob_path(file_ref))
    }

    /// Recursively remove the directory, succeeding if it does not exist
    pub fn remove_all(&self) -> io::Result<()> {
        remove_dir_all_if_exists(&self.path)
    }
}

/// Recursively remove a directory, succeeding if it does not exist
pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// A fully written blob that is not yet visible under its final name
#[derive(Debug)]
pub struct StagedBlob {
    file: NamedTempFile,
    file_ref: String,
    checksum: String,
    size: u64,
}

impl StagedBlob {
    /// File reference the blob will be committed under
    pub fn file_ref(&self) -> &str {
        &self.file_ref
    }

    /// Lowercase hex SHA-256 of the blob content
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Blob size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Make the blob visible under its final name
    ///
    /// This is an atomic rename within the type directory and cannot be
    /// undone by a later index rollback.
    pub fn commit(self, dir: &BlobDir, key: &ObjectKey) -> StoreResult<()> {
        let target = dir.blob_path(&self.file_ref);
        self.file
            .persist_noclobber(&target)
            .map_err(|e| StoreError::io(Some(key), &target, e.error))?;
        Ok(())
    }
}

/// Writer adapter that hashes and counts everything passing through it
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Flush the inner writer and return the hex digest and byte count
    fn finish(mut self) -> io::Result<(String, u64)> {
        self.inner.flush()?;
        Ok((format!("{:x}", self.hasher.finalize()), self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
