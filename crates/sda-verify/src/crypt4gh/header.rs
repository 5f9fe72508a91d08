use super::{
    open, read_u32_le, shared_key, Crypt4ghError, PrivateKey, SessionKey, DATA_CHACHA20, KEY_LEN,
    MAGIC, MAX_PACKET_LEN, METHOD_X25519_CHACHA20, NONCE_LEN, PACKET_DATA_EDIT_LIST,
    PACKET_DATA_ENC_PARAMS, TAG_LEN, VERSION,
};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const WRITER_PK_LEN: usize = 32;

/// Read a Crypt4GH header from `reader` and return the session keys it holds
/// for `key`.
///
/// The reader is left positioned at the first body segment. Packets that are
/// not addressed to `key` are skipped. Errors are I/O errors; format and key
/// problems carry a [`Crypt4ghError`] inside.
pub async fn read_header<R>(reader: &mut R, key: &PrivateKey) -> io::Result<Vec<SessionKey>>
where
    R: AsyncRead + Unpin,
{
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).await?;
    if &magic != MAGIC {
        return Err(Crypt4ghError::BadMagic.into());
    }

    let version = reader.read_u32_le().await?;
    if version != VERSION {
        return Err(Crypt4ghError::UnsupportedVersion(version).into());
    }

    let count = reader.read_u32_le().await?;
    let mut session_keys = Vec::new();

    for index in 0..count {
        let length = reader.read_u32_le().await?;
        if !(8..=MAX_PACKET_LEN).contains(&length) {
            return Err(Crypt4ghError::MalformedPacket(format!(
                "packet {} has length {}",
                index, length
            ))
            .into());
        }

        let mut packet = vec![0u8; length as usize - 4];
        reader.read_exact(&mut packet).await?;

        match open_packet(&packet, key)? {
            Some(session_key) => session_keys.push(session_key),
            None => tracing::trace!(packet = index, "Header packet not addressed to this key"),
        }
    }

    if session_keys.is_empty() {
        return Err(Crypt4ghError::NoSessionKey.into());
    }

    Ok(session_keys)
}

/// Decrypt one packet (without its length prefix). `None` means the packet is
/// for another recipient or uses a method this reader does not handle.
fn open_packet(packet: &[u8], key: &PrivateKey) -> Result<Option<SessionKey>, Crypt4ghError> {
    let method = read_u32_le(packet)
        .ok_or_else(|| Crypt4ghError::MalformedPacket("missing method".to_string()))?;
    if method != METHOD_X25519_CHACHA20 {
        return Ok(None);
    }

    let rest = &packet[4..];
    if rest.len() < WRITER_PK_LEN + NONCE_LEN + TAG_LEN {
        return Err(Crypt4ghError::MalformedPacket("packet too short".to_string()));
    }

    let (writer_pk, sealed) = rest.split_at(WRITER_PK_LEN);
    let mut writer = [0u8; WRITER_PK_LEN];
    writer.copy_from_slice(writer_pk);

    let dh = key.diffie_hellman(&writer);
    if dh.iter().all(|b| *b == 0) {
        return Ok(None);
    }

    let packet_key = shared_key(&dh, &key.public_key(), &writer);
    let Some(plain) = open(&packet_key, sealed) else {
        return Ok(None);
    };

    match read_u32_le(&plain) {
        Some(PACKET_DATA_ENC_PARAMS) => {
            let data_method = read_u32_le(&plain[4..]).ok_or_else(|| {
                Crypt4ghError::MalformedPacket("missing data encryption method".to_string())
            })?;
            if data_method != DATA_CHACHA20 {
                return Err(Crypt4ghError::UnsupportedMethod(data_method));
            }
            let session = plain.get(8..8 + KEY_LEN).ok_or_else(|| {
                Crypt4ghError::MalformedPacket("short data encryption key".to_string())
            })?;
            let mut session_key = [0u8; KEY_LEN];
            session_key.copy_from_slice(session);
            Ok(Some(session_key))
        }
        Some(PACKET_DATA_EDIT_LIST) => Err(Crypt4ghError::EditListUnsupported),
        Some(other) => Err(Crypt4ghError::MalformedPacket(format!(
            "unknown packet type {}",
            other
        ))),
        None => Err(Crypt4ghError::MalformedPacket("empty packet".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt4gh::seal;

    fn inner(e: io::Error) -> Crypt4ghError {
        *e.into_inner().unwrap().downcast::<Crypt4ghError>().unwrap()
    }

    #[tokio::test]
    async fn test_reads_session_key_and_stops_at_body() {
        let key = PrivateKey::generate();
        let (header, _) = seal(b"payload", &[key.public_key()]);

        let mut stream = header.clone();
        stream.extend_from_slice(b"BODY");
        let mut reader = stream.as_slice();

        let keys = read_header(&mut reader, &key).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(reader, b"BODY");
    }

    #[tokio::test]
    async fn test_skips_packets_for_other_recipients() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let (header, _) = seal(b"payload", &[other.public_key(), key.public_key()]);

        let keys = read_header(&mut header.as_slice(), &key).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_key_has_no_session_key() {
        let (header, _) = seal(b"payload", &[PrivateKey::generate().public_key()]);

        let err = read_header(&mut header.as_slice(), &PrivateKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(inner(err), Crypt4ghError::NoSessionKey));
    }

    #[tokio::test]
    async fn test_rejects_bad_magic_and_version() {
        let key = PrivateKey::generate();

        let err = read_header(&mut &b"crypt5gh\x01\0\0\0\0\0\0\0"[..], &key)
            .await
            .unwrap_err();
        assert!(matches!(inner(err), Crypt4ghError::BadMagic));

        let err = read_header(&mut &b"crypt4gh\x02\0\0\0\0\0\0\0"[..], &key)
            .await
            .unwrap_err();
        assert!(matches!(inner(err), Crypt4ghError::UnsupportedVersion(2)));
    }

    #[tokio::test]
    async fn test_truncated_header_is_eof() {
        let key = PrivateKey::generate();
        let (header, _) = seal(b"payload", &[key.public_key()]);

        let err = read_header(&mut &header[..header.len() - 5], &key)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
