//! Storage abstraction trait
//!
//! This module defines the Backend trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Readable byte stream over one stored file.
///
/// Dropping the reader closes it.
pub type FileReader = Pin<Box<dyn AsyncRead + Send>>;

/// Writable byte stream into one stored file.
///
/// Nothing is durable until [`FileWriter::close`] returns `Ok`. A writer that
/// is dropped without being closed discards whatever was written.
#[async_trait]
pub trait FileWriter: Send {
    /// Append a chunk. Surfaces any failure of the underlying upload.
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Finalize the file and return the number of bytes written.
    async fn close(self: Box<Self>) -> StorageResult<u64>;
}

/// Storage abstraction trait
///
/// Paths are relative to the backend root (a directory for POSIX, a bucket for
/// S3). Both implementations stream: neither ever holds a whole file in memory.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Size in bytes of the file at `path`.
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// Open `path` for reading.
    async fn open_reader(&self, path: &str) -> StorageResult<FileReader>;

    /// Open `path` for writing. The file is finalized by closing the writer.
    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn FileWriter>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
