//! Verify-work: decrypt an archived file and record its checksums.

use async_trait::async_trait;
use sda_core::{validate_outbound, AccessionRequest, ChecksumEntry, Schema, VerifyWork};
use sda_db::{DbError, FileRepository, VerifiedFile};
use sda_storage::Backend;
use sda_verify::{verify_archived, PrivateKey, VerificationResult};
use std::sync::Arc;

use crate::error::WorkError;
use crate::worker::UnitOfWork;

pub struct VerifyWorker {
    archive: Arc<dyn Backend>,
    repository: Arc<dyn FileRepository>,
    key: Arc<PrivateKey>,
}

impl VerifyWorker {
    pub fn new(
        archive: Arc<dyn Backend>,
        repository: Arc<dyn FileRepository>,
        key: Arc<PrivateKey>,
    ) -> Self {
        Self {
            archive,
            repository,
            key,
        }
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, WorkError> {
    i64::try_from(value).map_err(|_| WorkError::Persist(format!("{} {} overflows", what, value)))
}

#[async_trait]
impl UnitOfWork for VerifyWorker {
    type Message = VerifyWork;
    type Output = VerificationResult;

    const INBOUND: Schema = Schema::IngestionVerification;
    const NAME: &'static str = "verify";

    async fn process(&self, work: &VerifyWork) -> Result<Option<VerificationResult>, WorkError> {
        let header = self
            .repository
            .get_header(work.file_id)
            .await
            .map_err(|e| match e {
                DbError::NotFound(what) => WorkError::Lookup(what),
                other => WorkError::TransientIo(other.to_string()),
            })?;

        let archive_size = self.archive.size(&work.archive_path).await?;
        let reader = self.archive.open_reader(&work.archive_path).await?;
        let result = verify_archived(&header, reader, &self.key).await?;

        tracing::info!(
            file_id = work.file_id,
            archive_path = %work.archive_path,
            archive_size,
            decrypted_size = result.decrypted_size,
            "Archived file verified"
        );

        if result.archive_size != archive_size {
            return Err(WorkError::TransientIo(format!(
                "read {} bytes of {}, backend reports {}",
                result.archive_size, work.archive_path, archive_size
            )));
        }

        if !work.re_verify {
            return Ok(Some(result));
        }

        match work.encrypted_sha256() {
            Some(expected) if expected != result.archive_checksum => {
                Err(WorkError::Integrity(format!(
                    "archive checksum of {} is {}, expected {}",
                    work.archive_path, result.archive_checksum, expected
                )))
            }
            _ => {
                tracing::info!(
                    file_id = work.file_id,
                    archive_path = %work.archive_path,
                    "Re-verification passed"
                );
                Ok(None)
            }
        }
    }

    fn completion(
        &self,
        work: &VerifyWork,
        result: &VerificationResult,
    ) -> Result<Vec<u8>, WorkError> {
        let request = AccessionRequest {
            user: work.user.clone(),
            filepath: work.filepath.clone(),
            decrypted_checksums: vec![
                ChecksumEntry::sha256(result.decrypted_sha256.clone()),
                ChecksumEntry::md5(result.decrypted_md5.clone()),
            ],
        };
        Ok(validate_outbound(Schema::IngestionAccessionRequest, &request)?)
    }

    async fn persist(
        &self,
        work: &VerifyWork,
        result: &VerificationResult,
    ) -> Result<(), WorkError> {
        let file = VerifiedFile {
            archive_size: to_i64(result.archive_size, "archive size")?,
            archive_checksum: result.archive_checksum.clone(),
            decrypted_size: to_i64(result.decrypted_size, "decrypted size")?,
            decrypted_checksum: result.decrypted_sha256.clone(),
        };
        self.repository.mark_completed(&file, work.file_id).await?;
        Ok(())
    }
}
