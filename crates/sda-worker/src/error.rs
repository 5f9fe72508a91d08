//! Work error taxonomy
//!
//! Every failure while handling a delivery is one of these kinds, and the kind
//! alone decides how the delivery is resolved (see [`WorkError::disposition`]).

use sda_core::SchemaError;
use sda_db::DbError;
use sda_storage::StorageError;
use sda_verify::VerifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkError {
    /// The message is malformed or breaks its schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State the message refers to does not exist.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Backend read/write failure or size mismatch; may succeed later.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// A re-verification computed a different archive checksum.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("persisting state failed: {0}")]
    Persist(String),

    #[error("publishing failed: {0}")]
    Publish(String),
}

/// How a delivery that failed is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Negative-acknowledge with requeue.
    Requeue,
    /// Negative-acknowledge without requeue, optionally reporting to the error channel.
    Reject { report: bool },
}

impl WorkError {
    pub fn disposition(&self) -> Disposition {
        match self {
            WorkError::Validation(_)
            | WorkError::Lookup(_)
            | WorkError::Decrypt(_)
            | WorkError::Integrity(_) => Disposition::Reject { report: true },
            WorkError::TransientIo(_) | WorkError::Persist(_) | WorkError::Publish(_) => {
                Disposition::Requeue
            }
        }
    }

    /// Short kind name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkError::Validation(_) => "validation",
            WorkError::Lookup(_) => "lookup",
            WorkError::TransientIo(_) => "transient_io",
            WorkError::Decrypt(_) => "decrypt",
            WorkError::Integrity(_) => "integrity",
            WorkError::Persist(_) => "persist",
            WorkError::Publish(_) => "publish",
        }
    }
}

impl From<SchemaError> for WorkError {
    fn from(e: SchemaError) -> Self {
        WorkError::Validation(e.to_string())
    }
}

impl From<StorageError> for WorkError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(_) => WorkError::Validation(e.to_string()),
            other => WorkError::TransientIo(other.to_string()),
        }
    }
}

impl From<VerifyError> for WorkError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Decrypt(inner) => WorkError::Decrypt(inner.to_string()),
            VerifyError::Io(_) => WorkError::TransientIo(e.to_string()),
        }
    }
}

impl From<DbError> for WorkError {
    fn from(e: DbError) -> Self {
        WorkError::Persist(e.to_string())
    }
}
