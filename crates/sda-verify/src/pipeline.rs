//! Single-pass verification of an archived file
//!
//! ```text
//! header ──┐
//!          ├─ chain ─ decrypt ─ observe(md5, sha256) ─ sink
//! archive ─┴─ observe(sha256, count)
//! ```

use crate::crypt4gh::{decrypt_segments, read_header, Crypt4ghError, PrivateKey};
use crate::observe::{ByteCounter, ObservingReader};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::io;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

/// Checksums and sizes produced by one verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Bytes read from the archive (the body, without the header).
    pub archive_size: u64,
    /// sha256 over the archived bytes as read
    pub archive_checksum: String,
    pub decrypted_size: u64,
    pub decrypted_sha256: String,
    pub decrypted_md5: String,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    /// The header or the body cannot be decrypted; retrying will not help.
    #[error("decryption failed: {0}")]
    Decrypt(#[from] Crypt4ghError),

    /// Reading the archive failed.
    #[error("archive read failed: {0}")]
    Io(io::Error),
}

impl From<io::Error> for VerifyError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return VerifyError::Decrypt(Crypt4ghError::Truncated);
        }
        if e.get_ref().is_some_and(|inner| inner.is::<Crypt4ghError>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(c4gh) = inner.downcast::<Crypt4ghError>() {
                    return VerifyError::Decrypt(*c4gh);
                }
            }
            return VerifyError::Io(io::Error::other("undecodable decryption error"));
        }
        VerifyError::Io(e)
    }
}

/// Decrypt `header` followed by `archive` with `key` and compute the archive
/// checksum, the decrypted checksums and the decrypted size in one pass.
pub async fn verify_archived<R>(
    header: &[u8],
    archive: R,
    key: &PrivateKey,
) -> Result<VerificationResult, VerifyError>
where
    R: AsyncRead + Unpin,
{
    let started = Instant::now();

    let mut archive_sha = Sha256::new();
    let mut archive_count = ByteCounter::default();
    let mut decrypted_sha = Sha256::new();
    let mut decrypted_md5 = Md5::new();

    let decrypted_size = {
        let archive = ObservingReader::new(archive, vec![&mut archive_sha, &mut archive_count]);
        let mut input = header.chain(archive);

        let session_keys = read_header(&mut input, key).await?;
        let plaintext = StreamReader::new(Box::pin(decrypt_segments(input, session_keys)));
        let mut plaintext =
            ObservingReader::new(plaintext, vec![&mut decrypted_md5, &mut decrypted_sha]);

        tokio::io::copy(&mut plaintext, &mut tokio::io::sink()).await?
    };

    let result = VerificationResult {
        archive_size: archive_count.0,
        archive_checksum: hex::encode(archive_sha.finalize()),
        decrypted_size,
        decrypted_sha256: hex::encode(decrypted_sha.finalize()),
        decrypted_md5: hex::encode(decrypted_md5.finalize()),
    };

    tracing::debug!(
        archive_size = result.archive_size,
        decrypted_size = result.decrypted_size,
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Archived file verified"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt4gh::{seal, SEGMENT_SIZE};

    #[tokio::test]
    async fn test_checksums_match_independent_digests() {
        let key = PrivateKey::generate();
        let plaintext: Vec<u8> = (0..SEGMENT_SIZE * 3 + 5).map(|i| (i * 7 % 256) as u8).collect();
        let (header, body) = seal(&plaintext, &[key.public_key()]);

        let result = verify_archived(&header, body.as_slice(), &key).await.unwrap();

        assert_eq!(result.decrypted_size, plaintext.len() as u64);
        assert_eq!(result.decrypted_sha256, hex::encode(Sha256::digest(&plaintext)));
        assert_eq!(result.decrypted_md5, hex::encode(Md5::digest(&plaintext)));
        assert_eq!(result.archive_checksum, hex::encode(Sha256::digest(&body)));
        assert_eq!(result.archive_size, body.len() as u64);
    }

    #[tokio::test]
    async fn test_wrong_key_is_decrypt_error() {
        let (header, body) = seal(b"secret data", &[PrivateKey::generate().public_key()]);

        let err = verify_archived(&header, body.as_slice(), &PrivateKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Decrypt(Crypt4ghError::NoSessionKey)));
    }

    #[tokio::test]
    async fn test_corrupt_body_is_decrypt_error() {
        let key = PrivateKey::generate();
        let (header, mut body) = seal(&[5u8; 4096], &[key.public_key()]);
        let last = body.len() - 1;
        body[last] ^= 1;

        let err = verify_archived(&header, body.as_slice(), &key).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Decrypt(Crypt4ghError::SegmentAuthentication(0))
        ));
    }

    #[tokio::test]
    async fn test_archive_read_failure_is_io_error() {
        struct Failing;

        impl AsyncRead for Failing {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )))
            }
        }

        let key = PrivateKey::generate();
        let (header, _) = seal(b"data", &[key.public_key()]);

        let err = verify_archived(&header, Failing, &key).await.unwrap_err();
        assert!(matches!(err, VerifyError::Io(_)));
    }
}
