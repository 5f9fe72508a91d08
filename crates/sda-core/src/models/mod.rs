//! Data models for the ingestion workers
//!
//! Inbound work messages, outbound events, checksum entries and the persisted
//! file record, organized by concern.

mod checksum;
mod file;
mod message;

// Re-export all models for convenient imports
pub use checksum::{ChecksumAlgorithm, ChecksumEntry};
pub use file::{FileRecord, FileStatus};
pub use message::{
    AccessionRequest, CompletionMessage, CopyWork, ErrorEvent, VerifyWork, WorkMessage,
};
