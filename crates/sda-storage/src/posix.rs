use crate::traits::{Backend, FileReader, FileWriter, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tempfile::{NamedTempFile, TempPath};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[cfg(unix)]
const FILE_MODE: u32 = 0o640;

/// POSIX filesystem backend rooted at a configured directory
#[derive(Clone, Debug)]
pub struct PosixBackend {
    root: PathBuf,
}

impl PosixBackend {
    /// Create a new PosixBackend rooted at `root`
    ///
    /// The directory must already exist.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        let meta = fs::metadata(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Storage location {} is not accessible: {}",
                root.display(),
                e
            ))
        })?;
        if !meta.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "Storage location {} is not a directory",
                root.display()
            )));
        }

        Ok(PosixBackend { root })
    }

    /// Join `path` onto the root after cleaning it lexically.
    ///
    /// A leading `/` is relative to the root. Any `..` that would climb above
    /// the root is rejected.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(StorageError::InvalidPath(format!(
                            "{} resolves outside the storage root",
                            path
                        )));
                    }
                }
                Component::RootDir | Component::CurDir => {}
                Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath(path.to_string()));
                }
            }
        }

        if parts.is_empty() {
            return Err(StorageError::InvalidPath(format!("{:?} names no file", path)));
        }

        Ok(parts.iter().fold(self.root.clone(), |acc, part| acc.join(part)))
    }
}

fn not_found_or(path: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl Backend for PosixBackend {
    async fn size(&self, path: &str) -> StorageResult<u64> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| not_found_or(path, e))?;
        Ok(meta.len())
    }

    async fn open_reader(&self, path: &str) -> StorageResult<FileReader> {
        let full = self.resolve(path)?;

        let file = fs::File::open(&full).await.map_err(|e| {
            tracing::error!(
                path = %full.display(),
                error = %e,
                "Failed to open file for reading"
            );
            not_found_or(path, e)
        })?;

        tracing::debug!(path = %full.display(), "Opened file for reading");
        Ok(Box::pin(file))
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn FileWriter>> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).await?;

        let staging_dir = dir.clone();
        let staged = tokio::task::spawn_blocking(move || staging_file(&staging_dir))
            .await
            .map_err(|e| StorageError::UploadFailed(format!("staging task failed: {}", e)))?
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file in {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        let (file, staging) = staged.into_parts();

        Ok(Box::new(PosixWriter {
            file: fs::File::from_std(file),
            staging,
            target,
            written: 0,
            started: Instant::now(),
        }))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Posix
    }
}

/// Hidden sibling of the target, deleted when dropped unless persisted.
fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".sda-").suffix(".part");
    #[cfg(unix)]
    builder.permissions(std::fs::Permissions::from_mode(FILE_MODE));
    builder.tempfile_in(dir)
}

/// Bytes land in a staging file and only replace `target` on close.
struct PosixWriter {
    file: fs::File,
    staging: TempPath,
    target: PathBuf,
    written: u64,
    started: Instant,
}

#[async_trait]
impl FileWriter for PosixWriter {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.file.write_all(&chunk).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                self.target.display(),
                e
            ))
        })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> StorageResult<u64> {
        self.file.flush().await?;
        self.file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to sync file {}: {}",
                self.target.display(),
                e
            ))
        })?;

        let PosixWriter {
            file,
            staging,
            target,
            written,
            started,
        } = *self;
        drop(file);

        let destination = target.clone();
        tokio::task::spawn_blocking(move || staging.persist(&destination))
            .await
            .map_err(|e| StorageError::UploadFailed(format!("rename task failed: {}", e)))?
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move file into place at {}: {}",
                    target.display(),
                    e.error
                ))
            })?;

        tracing::debug!(
            path = %target.display(),
            size_bytes = written,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "POSIX write finished"
        );

        Ok(written)
    }
}
