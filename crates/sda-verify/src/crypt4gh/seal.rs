use super::{
    shared_key, PrivateKey, SessionKey, DATA_CHACHA20, MAGIC, METHOD_X25519_CHACHA20, NONCE_LEN,
    PACKET_DATA_ENC_PARAMS, SEGMENT_SIZE, VERSION,
};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// Encrypt `plaintext` for `recipients`, returning `(header, body)`.
///
/// Builds fixtures in the layout the archive stores: the header separately
/// from the body segments.
pub fn seal(plaintext: &[u8], recipients: &[[u8; 32]]) -> (Vec<u8>, Vec<u8>) {
    let writer = PrivateKey::generate();
    let session: SessionKey = rand::random();

    let mut params = PACKET_DATA_ENC_PARAMS.to_le_bytes().to_vec();
    params.extend_from_slice(&DATA_CHACHA20.to_le_bytes());
    params.extend_from_slice(&session);

    let mut header = MAGIC.to_vec();
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.extend_from_slice(&(recipients.len() as u32).to_le_bytes());

    for recipient in recipients {
        let dh = writer.diffie_hellman(recipient);
        let packet_key = shared_key(&dh, recipient, &writer.public_key());
        let sealed = seal_with(&packet_key, &params);

        let length = 4 + 4 + 32 + sealed.len();
        header.extend_from_slice(&(length as u32).to_le_bytes());
        header.extend_from_slice(&METHOD_X25519_CHACHA20.to_le_bytes());
        header.extend_from_slice(&writer.public_key());
        header.extend_from_slice(&sealed);
    }

    let body = plaintext
        .chunks(SEGMENT_SIZE)
        .flat_map(|segment| seal_with(&session, segment))
        .collect();

    (header, body)
}

fn seal_with(key: &SessionKey, plaintext: &[u8]) -> Vec<u8> {
    let nonce: [u8; NONCE_LEN] = rand::random();
    let ciphertext = ChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .expect("chacha20poly1305 accepts segment-sized input");

    let mut sealed = nonce.to_vec();
    sealed.extend(ciphertext);
    sealed
}
