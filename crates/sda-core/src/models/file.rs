use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Lifecycle status of an ingested file.
///
/// Ordered: `Registered < Archived < Completed < Ready`. Status only ever moves
/// forward (or stays put when an operation is re-applied).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "file_status", rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Registered,
    Archived,
    Completed,
    Ready,
}

impl FileStatus {
    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(self, next: FileStatus) -> bool {
        next >= self
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::Registered => write!(f, "REGISTERED"),
            FileStatus::Archived => write!(f, "ARCHIVED"),
            FileStatus::Completed => write!(f, "COMPLETED"),
            FileStatus::Ready => write!(f, "READY"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REGISTERED" => Ok(FileStatus::Registered),
            "ARCHIVED" => Ok(FileStatus::Archived),
            "COMPLETED" => Ok(FileStatus::Completed),
            "READY" => Ok(FileStatus::Ready),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// Persisted state of one ingested file, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: i64,
    pub submission_user: String,
    pub submission_file_path: String,
    pub archive_file_path: Option<String>,
    pub archive_file_size: Option<i64>,
    pub decrypted_file_size: Option<i64>,
    /// sha256 of the stored (encrypted) bytes
    pub archive_file_checksum: Option<String>,
    /// sha256 of the decrypted bytes
    pub decrypted_file_checksum: Option<String>,
    pub stable_id: Option<String>,
    pub status: FileStatus,
    pub updated_at: DateTime<Utc>,
}
