//! File state repository: the lifecycle of one ingested file in `sda.files`.

use super::retry::RetryPolicy;
use super::{DbError, DbResult};
use async_trait::async_trait;
use sda_core::FileStatus;
use sqlx::{PgPool, Postgres};

/// Where a file was archived, as recorded at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub archive_path: String,
    pub size: i64,
}

/// Outcome of verifying an archived file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedFile {
    pub archive_size: i64,
    /// sha256 of the archived (encrypted) bytes
    pub archive_checksum: String,
    pub decrypted_size: i64,
    /// sha256 of the decrypted bytes
    pub decrypted_checksum: String,
}

/// Persistence operations the workers depend on.
///
/// Every mutation is idempotent: re-applying it with the same arguments
/// leaves the record unchanged, and status never moves backwards.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Archive location of the file `user` submitted at `filepath` whose
    /// decrypted content has `checksum`.
    async fn get_archived(&self, user: &str, filepath: &str, checksum: &str)
        -> DbResult<ArchivedFile>;

    /// Stored Crypt4GH header of a file.
    async fn get_header(&self, file_id: i64) -> DbResult<Vec<u8>>;

    /// Record checksums and sizes and advance the file to `COMPLETED`.
    async fn mark_completed(&self, file: &VerifiedFile, file_id: i64) -> DbResult<()>;

    /// Assign the accession id and advance the file to `READY`.
    async fn mark_ready(
        &self,
        accession_id: &str,
        user: &str,
        filepath: &str,
        checksum: &str,
    ) -> DbResult<()>;
}

/// PostgreSQL implementation of [`FileRepository`].
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgFileRepository {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self), fields(db.table = "sda.files"))]
    async fn get_archived(
        &self,
        user: &str,
        filepath: &str,
        checksum: &str,
    ) -> DbResult<ArchivedFile> {
        let pool = &self.pool;
        let row: Option<(Option<String>, Option<i64>)> = self
            .retry
            .run("get_archived", move || {
                sqlx::query_as::<Postgres, (Option<String>, Option<i64>)>(
                    r#"
                    SELECT archive_file_path, archive_file_size
                    FROM sda.files
                    WHERE submission_user = $1
                      AND submission_file_path = $2
                      AND decrypted_file_checksum = $3
                      AND status IN ('COMPLETED', 'READY')
                    ORDER BY id DESC
                    LIMIT 1
                    "#,
                )
                .bind(user)
                .bind(filepath)
                .bind(checksum)
                .fetch_optional(pool)
            })
            .await?;

        match row {
            Some((Some(archive_path), Some(size))) => Ok(ArchivedFile { archive_path, size }),
            Some(_) => Err(DbError::InvalidData(format!(
                "{} of {} has no archive location",
                filepath, user
            ))),
            None => Err(DbError::NotFound(format!(
                "archived file {} of {}",
                filepath, user
            ))),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "sda.files", db.record_id = file_id))]
    async fn get_header(&self, file_id: i64) -> DbResult<Vec<u8>> {
        let pool = &self.pool;
        let header: Option<Option<String>> = self
            .retry
            .run("get_header", move || {
                sqlx::query_scalar::<Postgres, Option<String>>(
                    "SELECT header FROM sda.files WHERE id = $1",
                )
                .bind(file_id)
                .fetch_optional(pool)
            })
            .await?;

        let header = header
            .flatten()
            .ok_or_else(|| DbError::NotFound(format!("header of file {}", file_id)))?;

        hex::decode(header.trim())
            .map_err(|e| DbError::InvalidData(format!("header of file {}: {}", file_id, e)))
    }

    #[tracing::instrument(skip(self, file), fields(db.table = "sda.files", db.record_id = file_id))]
    async fn mark_completed(&self, file: &VerifiedFile, file_id: i64) -> DbResult<()> {
        let pool = &self.pool;
        let result = self
            .retry
            .run("mark_completed", move || {
                sqlx::query(
                    r#"
                    UPDATE sda.files
                    SET archive_file_size = $1,
                        archive_file_checksum = $2,
                        decrypted_file_size = $3,
                        decrypted_file_checksum = $4,
                        status = GREATEST(status, $5),
                        updated_at = now()
                    WHERE id = $6
                    "#,
                )
                .bind(file.archive_size)
                .bind(&file.archive_checksum)
                .bind(file.decrypted_size)
                .bind(&file.decrypted_checksum)
                .bind(FileStatus::Completed)
                .bind(file_id)
                .execute(pool)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("file {}", file_id)));
        }

        tracing::debug!(file_id, "File marked completed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "sda.files"))]
    async fn mark_ready(
        &self,
        accession_id: &str,
        user: &str,
        filepath: &str,
        checksum: &str,
    ) -> DbResult<()> {
        let pool = &self.pool;
        let result = self
            .retry
            .run("mark_ready", move || {
                sqlx::query(
                    r#"
                    UPDATE sda.files
                    SET stable_id = $1,
                        status = GREATEST(status, $2),
                        updated_at = now()
                    WHERE submission_user = $3
                      AND submission_file_path = $4
                      AND decrypted_file_checksum = $5
                      AND status IN ('COMPLETED', 'READY')
                    "#,
                )
                .bind(accession_id)
                .bind(FileStatus::Ready)
                .bind(user)
                .bind(filepath)
                .bind(checksum)
                .execute(pool)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "completed file {} of {}",
                filepath, user
            )));
        }

        tracing::debug!(accession_id, "File marked ready");
        Ok(())
    }
}
