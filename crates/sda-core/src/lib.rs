//! SDA Core Library
//!
//! This crate provides the domain models, message schemas and configuration
//! shared by the ingestion workers (copy-worker and verify-worker).

pub mod config;
pub mod models;
pub mod schema;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BrokerSettings, CryptConfig, DatabaseConfig, LogFormat, PosixConfig, S3Config, Service,
    StorageConfig, WorkerConfig,
};
pub use models::{
    AccessionRequest, ChecksumAlgorithm, ChecksumEntry, CompletionMessage, CopyWork, ErrorEvent,
    FileRecord, FileStatus, VerifyWork, WorkMessage,
};
pub use schema::{validate_message, validate_outbound, Schema, SchemaError};
pub use storage_types::StorageBackend;
