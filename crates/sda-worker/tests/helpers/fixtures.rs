use async_trait::async_trait;
use bytes::Bytes;
use sda_storage::{Backend, FileReader, FileWriter, PosixBackend, StorageBackend, StorageResult};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A POSIX backend over its own temporary directory.
pub struct TestStorage {
    pub temp_dir: TempDir,
    pub backend: Arc<dyn Backend>,
}

impl TestStorage {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = PosixBackend::new(temp_dir.path())
            .await
            .expect("Failed to create posix backend");
        Self {
            temp_dir,
            backend: Arc::new(backend),
        }
    }

    pub fn path(&self, relative: &str) -> std::path::PathBuf {
        self.temp_dir.path().join(relative)
    }

    /// Put `contents` at `relative`, creating parent directories.
    pub fn put(&self, relative: &str, contents: &[u8]) {
        let path = self.path(relative);
        if let Some(parent) = Path::new(&path).parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, relative: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path(relative)).ok()
    }
}

/// Deterministic non-trivial content of `len` bytes.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Backend whose readers fail after handing out `limit` bytes.
pub struct InterruptedReads {
    pub inner: Arc<dyn Backend>,
    pub limit: u64,
}

#[async_trait]
impl Backend for InterruptedReads {
    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.inner.size(path).await
    }

    async fn open_reader(&self, path: &str) -> StorageResult<FileReader> {
        let reader = self.inner.open_reader(path).await?;
        Ok(Box::pin(reader.take(self.limit).chain(ResetRead)))
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn FileWriter>> {
        self.inner.open_writer(path).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

struct ResetRead;

impl AsyncRead for ResetRead {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "archive read interrupted",
        )))
    }
}

/// Backend that records the size of every chunk written through it.
pub struct RecordingWrites {
    pub inner: Arc<dyn Backend>,
    pub chunks: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Backend for RecordingWrites {
    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.inner.size(path).await
    }

    async fn open_reader(&self, path: &str) -> StorageResult<FileReader> {
        self.inner.open_reader(path).await
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn FileWriter>> {
        Ok(Box::new(RecordingWriter {
            inner: self.inner.open_writer(path).await?,
            chunks: self.chunks.clone(),
        }))
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

struct RecordingWriter {
    inner: Box<dyn FileWriter>,
    chunks: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl FileWriter for RecordingWriter {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.chunks.lock().unwrap().push(chunk.len());
        self.inner.write(chunk).await
    }

    async fn close(self: Box<Self>) -> StorageResult<u64> {
        self.inner.close().await
    }
}
