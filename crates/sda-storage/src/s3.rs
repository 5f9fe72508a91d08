use crate::traits::{Backend, FileReader, FileWriter, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{
    Certificate, ClientOptions, Error as ObjectStoreError, ObjectStore, ObjectStoreExt,
    WriteMultipart,
};
use sda_core::S3Config;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;

/// Chunks buffered between a writer and its upload task.
const PIPE_DEPTH: usize = 4;

/// S3-compatible object storage backend
#[derive(Clone)]
pub struct S3Backend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    chunk_size: usize,
    upload_concurrency: usize,
}

impl S3Backend {
    /// Create a new S3Backend from configuration
    ///
    /// A configured CA certificate is read here, so a missing or unreadable
    /// file fails construction rather than the first request.
    pub async fn new(config: &S3Config) -> StorageResult<Self> {
        let mut client_options = ClientOptions::new();

        if let Some(ref ca_path) = config.ca_cert {
            let pem = tokio::fs::read(ca_path).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to read CA certificate {}: {}",
                    ca_path, e
                ))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                StorageError::ConfigError(format!("Invalid CA certificate {}: {}", ca_path, e))
            })?;
            client_options = client_options.with_root_certificate(cert);
        }

        let allow_http = config.url.starts_with("http://");

        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint())
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone())
            .with_access_key_id(config.access_key.clone())
            .with_secret_access_key(config.secret_key.clone())
            .with_virtual_hosted_style_request(false)
            .with_allow_http(allow_http)
            .with_client_options(client_options)
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        if allow_http {
            tracing::warn!(
                endpoint = %config.endpoint(),
                "S3 endpoint uses plain HTTP"
            );
        }

        Ok(Self::from_store(
            Arc::new(store),
            config.bucket.clone(),
            config.chunk_size,
            config.upload_concurrency,
        ))
    }

    /// Wrap an already-built object store
    pub fn from_store(
        store: Arc<dyn ObjectStore>,
        bucket: String,
        chunk_size: usize,
        upload_concurrency: usize,
    ) -> Self {
        S3Backend {
            store,
            bucket,
            chunk_size,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    fn map_error(&self, path: &str, e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    path = %path,
                    "S3 request failed"
                );
                StorageError::BackendError(other.to_string())
            }
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn size(&self, path: &str) -> StorageResult<u64> {
        let location = Path::from(path);
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| self.map_error(path, e))?;
        Ok(meta.size)
    }

    async fn open_reader(&self, path: &str) -> StorageResult<FileReader> {
        let location = Path::from(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.map_error(path, e))?;

        tracing::debug!(
            bucket = %self.bucket,
            path = %path,
            size_bytes = result.meta.size,
            "Opened S3 object for reading"
        );

        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn FileWriter>> {
        let location = Path::from(path);
        let (tx, rx) = mpsc::channel(PIPE_DEPTH);

        let task = tokio::spawn(upload(
            self.store.clone(),
            location,
            rx,
            self.chunk_size,
            self.upload_concurrency,
        ));

        Ok(Box::new(S3Writer {
            tx,
            task: Some(task),
            path: path.to_string(),
            bucket: self.bucket.clone(),
            started: Instant::now(),
        }))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

enum Part {
    Data(Bytes),
    Finish,
}

/// Background half of an S3 writer: drains the pipe into a multipart upload.
async fn upload(
    store: Arc<dyn ObjectStore>,
    location: Path,
    mut rx: mpsc::Receiver<Part>,
    chunk_size: usize,
    concurrency: usize,
) -> StorageResult<u64> {
    let multipart = store
        .put_multipart(&location)
        .await
        .map_err(|e| StorageError::UploadFailed(format!("{}: {}", location, e)))?;
    let mut writer = WriteMultipart::new_with_chunk_size(multipart, chunk_size);
    let mut written = 0u64;

    loop {
        match rx.recv().await {
            Some(Part::Data(chunk)) => {
                if let Err(e) = writer.wait_for_capacity(concurrency).await {
                    let _ = writer.abort().await;
                    return Err(StorageError::UploadFailed(format!("{}: {}", location, e)));
                }
                written += chunk.len() as u64;
                writer.write(&chunk);
            }
            Some(Part::Finish) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| StorageError::UploadFailed(format!("{}: {}", location, e)))?;
                return Ok(written);
            }
            None => {
                let _ = writer.abort().await;
                return Err(StorageError::UploadFailed(format!(
                    "{}: writer dropped before close",
                    location
                )));
            }
        }
    }
}

struct S3Writer {
    tx: mpsc::Sender<Part>,
    task: Option<JoinHandle<StorageResult<u64>>>,
    path: String,
    bucket: String,
    started: Instant,
}

impl S3Writer {
    /// Wait for the upload task and return its outcome.
    async fn join(&mut self) -> StorageResult<u64> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| StorageError::UploadFailed(format!("upload task failed: {}", e)))?,
            None => Err(StorageError::UploadFailed(format!(
                "{}: upload already finished",
                self.path
            ))),
        }
    }

    async fn send(&mut self, part: Part) -> StorageResult<()> {
        if self.tx.send(part).await.is_ok() {
            return Ok(());
        }
        // The task only hangs up on error; surface that error here.
        match self.join().await {
            Ok(_) => Err(StorageError::UploadFailed(format!(
                "{}: upload ended early",
                self.path
            ))),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FileWriter for S3Writer {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.send(Part::Data(chunk)).await
    }

    async fn close(mut self: Box<Self>) -> StorageResult<u64> {
        let result = match self.send(Part::Finish).await {
            Ok(()) => self.join().await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(size) => tracing::debug!(
                bucket = %self.bucket,
                path = %self.path,
                size_bytes = size,
                duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
                "S3 multipart upload finished"
            ),
            Err(e) => tracing::error!(
                bucket = %self.bucket,
                path = %self.path,
                error = %e,
                duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
                "S3 multipart upload failed"
            ),
        }

        result
    }
}
