//! Decrypts fixtures produced outside this crate: an scrypt-protected c4gh-v1
//! key and a two-recipient archive whose second header packet is ours.
//!
//! Run with: `cargo test -p sda-verify --test known_answer_test`

use sda_verify::{verify_archived, Crypt4ghError, PrivateKey, VerifyError};

const KEY_PEM: &[u8] = include_bytes!("data/reader.sec.pem");
const PASSPHRASE: &str = "correct horse battery staple";
const HEADER: &[u8] = include_bytes!("data/fixture.header");
const BODY: &[u8] = include_bytes!("data/fixture.c4gh");

const PUBLIC_KEY: &str = "84dcf42decb957d9781ea947ca0a56b85433780ab84e2d544d264b0f33799d2e";
const PLAINTEXT_LEN: u64 = 150_000;
const PLAINTEXT_SHA256: &str = "02675bf9284bd74223e98ceea96ebee4c9a469272ead358f462d89753f8c909b";
const PLAINTEXT_MD5: &str = "bd76e6371ec897f022c87de1d3046633";
const ARCHIVE_SHA256: &str = "913e40be4b5d652249019bdb467d2eba00bcc254a0f89e2d59eea4ac058e0a79";

#[test]
fn test_key_file_decrypts_to_known_public_key() {
    let key = PrivateKey::from_pem(KEY_PEM, PASSPHRASE).unwrap();
    assert_eq!(hex::encode(key.public_key()), PUBLIC_KEY);
}

#[test]
fn test_key_file_rejects_wrong_passphrase() {
    let err = PrivateKey::from_pem(KEY_PEM, "not the passphrase").unwrap_err();
    assert!(matches!(err, Crypt4ghError::BadPassphrase));
}

#[tokio::test]
async fn test_archive_reproduces_known_digests() {
    let key = PrivateKey::from_pem(KEY_PEM, PASSPHRASE).unwrap();

    let result = verify_archived(HEADER, BODY, &key).await.unwrap();

    assert_eq!(result.decrypted_size, PLAINTEXT_LEN);
    assert_eq!(result.decrypted_sha256, PLAINTEXT_SHA256);
    assert_eq!(result.decrypted_md5, PLAINTEXT_MD5);
    assert_eq!(result.archive_checksum, ARCHIVE_SHA256);
    assert_eq!(result.archive_size, BODY.len() as u64);
}

#[tokio::test]
async fn test_archive_is_unreadable_for_other_keys() {
    let err = verify_archived(HEADER, BODY, &PrivateKey::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Decrypt(Crypt4ghError::NoSessionKey)));
}
