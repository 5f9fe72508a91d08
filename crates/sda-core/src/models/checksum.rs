use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use validator::{Validate, ValidationError};

/// Checksum algorithms understood by the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Md5,
}

impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

/// A single `{type, value}` checksum as carried in pipeline messages.
///
/// `value` is a lowercase hex digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_checksum_value"))]
pub struct ChecksumEntry {
    #[serde(rename = "type")]
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

impl ChecksumEntry {
    pub fn new(algorithm: ChecksumAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }

    pub fn sha256(value: impl Into<String>) -> Self {
        Self::new(ChecksumAlgorithm::Sha256, value)
    }

    pub fn md5(value: impl Into<String>) -> Self {
        Self::new(ChecksumAlgorithm::Md5, value)
    }

    /// Returns the value of the last entry for `algorithm`, if any.
    ///
    /// Only one entry per algorithm is meaningful; a later duplicate wins.
    pub fn find(entries: &[ChecksumEntry], algorithm: ChecksumAlgorithm) -> Option<&str> {
        entries
            .iter()
            .rev()
            .find(|entry| entry.algorithm == algorithm)
            .map(|entry| entry.value.as_str())
    }
}

fn validate_checksum_value(entry: &ChecksumEntry) -> Result<(), ValidationError> {
    let is_lower_hex = !entry.value.is_empty()
        && entry
            .value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if !is_lower_hex {
        let mut err = ValidationError::new("checksum_value");
        err.message = Some(
            format!(
                "{} checksum must be a non-empty lowercase hex string",
                entry.algorithm
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_prefers_last_entry() {
        let entries = vec![
            ChecksumEntry::sha256("aa"),
            ChecksumEntry::md5("bb"),
            ChecksumEntry::sha256("cc"),
        ];
        assert_eq!(
            ChecksumEntry::find(&entries, ChecksumAlgorithm::Sha256),
            Some("cc")
        );
        assert_eq!(ChecksumEntry::find(&entries, ChecksumAlgorithm::Md5), Some("bb"));
        assert_eq!(ChecksumEntry::find(&[], ChecksumAlgorithm::Md5), None);
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        assert!(ChecksumEntry::sha256("abc123").validate().is_ok());
        assert!(ChecksumEntry::sha256("ABC123").validate().is_err());
        assert!(ChecksumEntry::sha256("").validate().is_err());
        assert!(ChecksumEntry::md5("xyz").validate().is_err());
    }

    #[test]
    fn serializes_with_type_key() {
        let json = serde_json::to_value(ChecksumEntry::md5("00ff")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "md5", "value": "00ff"}));
    }
}
