//! Crypt4GH container decryption
//!
//! A Crypt4GH file is a header of encrypted packets followed by a body of
//! independently authenticated ChaCha20-Poly1305 segments. The header carries
//! the session keys for the body, each packet encrypted to one recipient with
//! an X25519 key exchange.

mod body;
mod header;
mod keys;
#[cfg(any(test, feature = "test-helpers"))]
mod seal;

pub use body::decrypt_segments;
pub use header::read_header;
pub use keys::PrivateKey;
#[cfg(any(test, feature = "test-helpers"))]
pub use seal::seal;

use blake2::{Blake2b512, Digest};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;

pub const MAGIC: &[u8; 8] = b"crypt4gh";
pub const VERSION: u32 = 1;

/// X25519 key exchange + ChaCha20-IETF-Poly1305 header packets.
pub(crate) const METHOD_X25519_CHACHA20: u32 = 0;
/// ChaCha20-IETF-Poly1305 body segments.
pub(crate) const DATA_CHACHA20: u32 = 0;

pub(crate) const PACKET_DATA_ENC_PARAMS: u32 = 0;
pub(crate) const PACKET_DATA_EDIT_LIST: u32 = 1;

pub(crate) const NONCE_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;
pub(crate) const KEY_LEN: usize = 32;

pub const SEGMENT_SIZE: usize = 65_536;
pub(crate) const CIPHER_SEGMENT_SIZE: usize = NONCE_LEN + SEGMENT_SIZE + TAG_LEN;

/// Upper bound for one header packet; real packets are ~100 bytes.
pub(crate) const MAX_PACKET_LEN: u32 = 64 * 1024;

pub type SessionKey = [u8; KEY_LEN];

#[derive(Debug, Error)]
pub enum Crypt4ghError {
    #[error("not a Crypt4GH stream")]
    BadMagic,

    #[error("unsupported Crypt4GH version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed header packet: {0}")]
    MalformedPacket(String),

    #[error("unsupported encryption method {0}")]
    UnsupportedMethod(u32),

    #[error("data edit lists are not supported")]
    EditListUnsupported,

    #[error("no header packet could be decrypted with this key")]
    NoSessionKey,

    #[error("segment {0} failed authentication")]
    SegmentAuthentication(u64),

    #[error("stream is truncated")]
    Truncated,

    #[error("invalid key file: {0}")]
    InvalidKey(String),

    #[error("wrong passphrase for key file")]
    BadPassphrase,
}

/// Key shared by a reader and the writer of a header packet.
///
/// The reader takes the receiving half of the X25519 session keys, which is
/// the first half of BLAKE2b-512(dh || reader_pk || writer_pk).
pub(crate) fn shared_key(dh: &[u8; 32], reader_pk: &[u8; 32], writer_pk: &[u8; 32]) -> SessionKey {
    let mut hasher = Blake2b512::new();
    hasher.update(dh);
    hasher.update(reader_pk);
    hasher.update(writer_pk);
    let digest = hasher.finalize();

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

/// Open `nonce || ciphertext || tag` with `key`.
pub(crate) fn open(key: &SessionKey, sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return None;
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .ok()
}

pub(crate) fn read_u32_le(bytes: &[u8]) -> Option<u32> {
    bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

impl From<Crypt4ghError> for std::io::Error {
    fn from(e: Crypt4ghError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}
