use super::{open, Crypt4ghError, SessionKey, CIPHER_SEGMENT_SIZE, NONCE_LEN, TAG_LEN};
use bytes::Bytes;
use futures::Stream;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Decrypt the body segments read from `reader` into a stream of plaintext.
///
/// Each segment is tried against every session key. A segment no key
/// authenticates ends the stream with [`Crypt4ghError::SegmentAuthentication`].
pub fn decrypt_segments<R>(
    reader: R,
    keys: Vec<SessionKey>,
) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    futures::stream::try_unfold((reader, keys, 0u64), next_segment)
}

type SegmentState<R> = (R, Vec<SessionKey>, u64);

async fn next_segment<R>(
    (mut reader, keys, index): SegmentState<R>,
) -> io::Result<Option<(Bytes, SegmentState<R>)>>
where
    R: AsyncRead + Unpin,
{
    let mut segment = vec![0u8; CIPHER_SEGMENT_SIZE];
    let filled = read_full(&mut reader, &mut segment).await?;

    if filled == 0 {
        return Ok(None);
    }
    if filled <= NONCE_LEN + TAG_LEN {
        return Err(Crypt4ghError::Truncated.into());
    }

    let plain = keys
        .iter()
        .find_map(|key| open(key, &segment[..filled]))
        .ok_or(Crypt4ghError::SegmentAuthentication(index))?;

    Ok(Some((Bytes::from(plain), (reader, keys, index + 1))))
}

/// Fill `buf` unless the reader hits EOF first; returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
