//! Copy-work: replicate an archived file into the backup backend.

use async_trait::async_trait;
use futures::StreamExt;
use sda_core::{validate_outbound, CompletionMessage, CopyWork, Schema};
use sda_db::{DbError, FileRepository};
use sda_storage::Backend;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;

use crate::error::WorkError;
use crate::worker::UnitOfWork;

/// Read size used when streaming an archived file into the backup.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Where a copy landed and how many bytes it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub archive_path: String,
    pub size: u64,
}

pub struct CopyWorker {
    archive: Arc<dyn Backend>,
    backup: Arc<dyn Backend>,
    repository: Arc<dyn FileRepository>,
}

impl CopyWorker {
    pub fn new(
        archive: Arc<dyn Backend>,
        backup: Arc<dyn Backend>,
        repository: Arc<dyn FileRepository>,
    ) -> Self {
        Self {
            archive,
            backup,
            repository,
        }
    }

    /// Stream `path` from the archive into the backup and return the number of
    /// bytes written.
    async fn copy(&self, path: &str) -> Result<u64, WorkError> {
        let started = Instant::now();
        let reader = self.archive.open_reader(path).await?;
        let mut writer = self.backup.open_writer(path).await?;

        let mut chunks = ReaderStream::with_capacity(reader, COPY_CHUNK_SIZE);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| {
                WorkError::TransientIo(format!("reading {} from archive: {}", path, e))
            })?;
            writer.write(chunk).await?;
        }
        let written = writer.close().await?;

        tracing::debug!(
            archive_path = %path,
            size = written,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Copied file to backup"
        );

        Ok(written)
    }
}

#[async_trait]
impl UnitOfWork for CopyWorker {
    type Message = CopyWork;
    type Output = CopiedFile;

    const INBOUND: Schema = Schema::IngestionAccession;
    const NAME: &'static str = "copy";

    async fn process(&self, work: &CopyWork) -> Result<Option<CopiedFile>, WorkError> {
        let checksum = work.decrypted_sha256().ok_or_else(|| {
            WorkError::Validation("message carries no decrypted sha256 checksum".to_string())
        })?;

        let archived = self
            .repository
            .get_archived(&work.user, &work.filepath, checksum)
            .await
            .map_err(|e| match e {
                DbError::NotFound(what) => {
                    WorkError::TransientIo(format!("{} is not archived yet", what))
                }
                other => WorkError::TransientIo(other.to_string()),
            })?;

        let expected = u64::try_from(archived.size).map_err(|_| {
            WorkError::TransientIo(format!(
                "recorded size {} of {} is negative",
                archived.size, archived.archive_path
            ))
        })?;

        let size = self.copy(&archived.archive_path).await?;
        if size != expected {
            return Err(WorkError::TransientIo(format!(
                "copied {} bytes of {}, expected {}",
                size, archived.archive_path, expected
            )));
        }

        tracing::info!(
            archive_path = %archived.archive_path,
            size,
            "File copied to backup"
        );

        Ok(Some(CopiedFile {
            archive_path: archived.archive_path,
            size,
        }))
    }

    fn completion(&self, work: &CopyWork, _copied: &CopiedFile) -> Result<Vec<u8>, WorkError> {
        let completion = CompletionMessage::from(work);
        Ok(validate_outbound(Schema::IngestionCompletion, &completion)?)
    }

    async fn persist(&self, work: &CopyWork, _copied: &CopiedFile) -> Result<(), WorkError> {
        let checksum = work.decrypted_sha256().ok_or_else(|| {
            WorkError::Validation("message carries no decrypted sha256 checksum".to_string())
        })?;

        self.repository
            .mark_ready(&work.accession_id, &work.user, &work.filepath, checksum)
            .await?;
        Ok(())
    }
}
