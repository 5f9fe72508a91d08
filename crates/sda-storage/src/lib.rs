//! SDA Storage Library
//!
//! This crate provides the storage abstraction the ingestion workers read and
//! write files through. It includes the Backend trait and implementations for
//! a POSIX directory tree and S3-compatible object storage.
//!
//! # Paths
//!
//! Paths are relative to the backend root. For POSIX they are cleaned and
//! confined under the configured directory; for S3 they are object keys in the
//! configured bucket.

pub mod factory;
#[cfg(feature = "storage-posix")]
pub mod posix;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_backend;
#[cfg(feature = "storage-posix")]
pub use posix::PosixBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Backend;
pub use sda_core::StorageBackend;
pub use traits::{Backend, FileReader, FileWriter, StorageError, StorageResult};
