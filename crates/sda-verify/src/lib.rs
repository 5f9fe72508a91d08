//! SDA Verify Library
//!
//! Decrypts archived Crypt4GH files in a single streaming pass while computing
//! the archive checksum and the decrypted checksums.

pub mod crypt4gh;
pub mod observe;
pub mod pipeline;

pub use crypt4gh::{Crypt4ghError, PrivateKey};
pub use observe::{ByteCounter, Observer, ObservingReader};
pub use pipeline::{verify_archived, VerificationResult, VerifyError};
