#[cfg(feature = "storage-posix")]
use crate::PosixBackend;
#[cfg(feature = "storage-s3")]
use crate::S3Backend;
use crate::{Backend, StorageResult};
use sda_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_backend(config: &StorageConfig) -> StorageResult<Arc<dyn Backend>> {
    match config {
        #[cfg(feature = "storage-s3")]
        StorageConfig::S3(s3) => {
            let backend = S3Backend::new(s3).await?;
            tracing::info!(
                endpoint = %s3.endpoint(),
                bucket = %s3.bucket,
                chunk_size = s3.chunk_size,
                upload_concurrency = s3.upload_concurrency,
                "S3 storage backend ready"
            );
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageConfig::S3(_) => Err(crate::StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-posix")]
        StorageConfig::Posix(posix) => {
            let backend = PosixBackend::new(&posix.location).await?;
            tracing::info!(location = %posix.location, "POSIX storage backend ready");
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-posix"))]
        StorageConfig::Posix(_) => Err(crate::StorageError::ConfigError(
            "POSIX storage backend not available (storage-posix feature not enabled)".to_string(),
        )),
    }
}
