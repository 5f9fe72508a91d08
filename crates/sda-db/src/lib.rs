//! SDA DB Library
//!
//! Persistence of per-file ingestion state. Workers talk to the
//! [`FileRepository`] trait; [`PgFileRepository`] implements it on PostgreSQL.

pub mod db;

pub use db::{
    connect, ArchivedFile, DbError, DbResult, FileRepository, PgFileRepository, RetryPolicy,
    VerifiedFile,
};
