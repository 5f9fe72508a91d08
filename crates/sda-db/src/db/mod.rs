//! Database repositories for data access layer
//
// File state repository (contract + PostgreSQL implementation)
pub mod files;
//
// Connection pool setup
pub mod pool;
//
// Retry discipline for connection-class failures
pub mod retry;

pub use files::{ArchivedFile, FileRepository, PgFileRepository, VerifiedFile};
pub use pool::connect;
pub use retry::RetryPolicy;

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type DbResult<T> = Result<T, DbError>;
