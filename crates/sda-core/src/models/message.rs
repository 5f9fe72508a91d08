use serde::{Deserialize, Serialize};
use validator::Validate;

use super::checksum::{ChecksumAlgorithm, ChecksumEntry};

/// Fields every inbound work message exposes for logging and error reports.
pub trait WorkMessage {
    fn user(&self) -> &str;
    fn filepath(&self) -> &str;
    fn accession_id(&self) -> Option<&str> {
        None
    }
}

/// Copy-work inbound message (`ingestion-accession` schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct CopyWork {
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub kind: String,
    #[validate(length(min = 1))]
    pub user: String,
    #[validate(length(min = 1))]
    pub filepath: String,
    #[validate(length(min = 1))]
    pub accession_id: String,
    #[validate(length(min = 1), nested)]
    pub decrypted_checksums: Vec<ChecksumEntry>,
}

impl CopyWork {
    pub fn decrypted_sha256(&self) -> Option<&str> {
        ChecksumEntry::find(&self.decrypted_checksums, ChecksumAlgorithm::Sha256)
    }
}

impl WorkMessage for CopyWork {
    fn user(&self) -> &str {
        &self.user
    }

    fn filepath(&self) -> &str {
        &self.filepath
    }

    fn accession_id(&self) -> Option<&str> {
        Some(&self.accession_id)
    }
}

/// Verify-work inbound message (`ingestion-verification` schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct VerifyWork {
    #[validate(length(min = 1))]
    pub filepath: String,
    #[validate(length(min = 1))]
    pub user: String,
    #[validate(range(min = 1))]
    pub file_id: i64,
    #[validate(length(min = 1))]
    pub archive_path: String,
    #[serde(default)]
    #[validate(nested)]
    pub encrypted_checksums: Vec<ChecksumEntry>,
    #[serde(default)]
    pub re_verify: bool,
}

impl VerifyWork {
    pub fn encrypted_sha256(&self) -> Option<&str> {
        ChecksumEntry::find(&self.encrypted_checksums, ChecksumAlgorithm::Sha256)
    }
}

impl WorkMessage for VerifyWork {
    fn user(&self) -> &str {
        &self.user
    }

    fn filepath(&self) -> &str {
        &self.filepath
    }
}

/// Verify-work outbound message (`ingestion-accession-request` schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct AccessionRequest {
    #[validate(length(min = 1))]
    pub user: String,
    #[validate(length(min = 1))]
    pub filepath: String,
    #[validate(length(min = 1), nested)]
    pub decrypted_checksums: Vec<ChecksumEntry>,
}

/// Copy-work outbound message (`ingestion-completion` schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct CompletionMessage {
    #[validate(length(min = 1))]
    pub user: String,
    #[validate(length(min = 1))]
    pub filepath: String,
    #[validate(length(min = 1))]
    pub accession_id: String,
    #[validate(length(min = 1), nested)]
    pub decrypted_checksums: Vec<ChecksumEntry>,
}

impl From<&CopyWork> for CompletionMessage {
    fn from(work: &CopyWork) -> Self {
        Self {
            user: work.user.clone(),
            filepath: work.filepath.clone(),
            accession_id: work.accession_id.clone(),
            decrypted_checksums: work.decrypted_checksums.clone(),
        }
    }
}

/// Diagnostic event published to the error routing key.
///
/// `original_message` carries the inbound body verbatim (as JSON when it parses,
/// as a string otherwise) so an operator can replay it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    pub reason: String,
    pub original_message: serde_json::Value,
}

impl ErrorEvent {
    pub fn new(reason: impl Into<String>, body: &[u8]) -> Self {
        let original_message = serde_json::from_slice(body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
        });

        Self {
            user: None,
            filepath: None,
            reason: reason.into(),
            original_message,
        }
    }

    pub fn with_message(mut self, message: &dyn WorkMessage) -> Self {
        self.user = Some(message.user().to_string());
        self.filepath = Some(message.filepath().to_string());
        self
    }
}
