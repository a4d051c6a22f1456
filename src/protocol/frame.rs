//! Frame boundaries and frame-level crypto
//!
//! A frame on the wire is `u16 len | len bytes`. Two readers are provided:
//! `read_frame` for the strictly sequential handshake phases, and
//! `FrameCodec` for the relay, where reads race inside `select!` and must not
//! lose bytes when the other branch wins.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

use super::message::{adler_checksum, Message, CHECKSUM_SIZE, LENGTH_SIZE};
use crate::crypto::{xtea, SessionKey};
use crate::error::{ProxyError, Result};

/// Length-prefixed frame splitter for `FramedRead`
///
/// Yields whole frames including their length prefix. At end of stream any
/// leftover bytes are yielded as one final short frame so the relay can pass
/// them through instead of dropping them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Vec<u8>>> {
        if src.len() < LENGTH_SIZE {
            return Ok(None);
        }
        let declared = u16::from_le_bytes([src[0], src[1]]) as usize;
        let total = LENGTH_SIZE + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(total).to_vec()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Vec<u8>>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let partial = src.to_vec();
        src.advance(partial.len());
        Ok(Some(partial))
    }
}

/// Read exactly one frame, length prefix included
///
/// Not cancel-safe; only for phases where nothing else reads the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let declared = u16::from_le_bytes(len_buf) as usize;
    let mut frame = vec![0u8; LENGTH_SIZE + declared];
    frame[..LENGTH_SIZE].copy_from_slice(&len_buf);
    reader.read_exact(&mut frame[LENGTH_SIZE..]).await?;
    Ok(frame)
}

/// Validate and decrypt an encrypted frame
///
/// Returns a message over exactly the inner payload, padding stripped.
pub fn decrypt_frame(raw: &[u8], key: &SessionKey) -> Result<Message> {
    if raw.len() < LENGTH_SIZE {
        return Err(ProxyError::Framing(format!(
            "frame of {} bytes has no length prefix",
            raw.len()
        )));
    }
    let declared = u16::from_le_bytes([raw[0], raw[1]]) as usize;
    if declared != raw.len() - LENGTH_SIZE {
        return Err(ProxyError::Framing(format!(
            "declared length {} but {} bytes follow",
            declared,
            raw.len() - LENGTH_SIZE
        )));
    }
    if declared < CHECKSUM_SIZE {
        return Err(ProxyError::Framing(format!(
            "declared length {} leaves no room for the checksum",
            declared
        )));
    }

    let header = LENGTH_SIZE + CHECKSUM_SIZE;
    let mut body = raw[header..].to_vec();
    if body.is_empty() || body.len() % xtea::BLOCK_SIZE != 0 {
        return Err(ProxyError::Framing(format!(
            "ciphertext of {} bytes is not whole XTEA blocks",
            body.len()
        )));
    }
    let expected = u32::from_le_bytes([raw[2], raw[3], raw[4], raw[5]]);
    let actual = adler_checksum(&body);
    if expected != actual {
        return Err(ProxyError::Framing(format!(
            "checksum mismatch: frame says {:08x}, computed {:08x}",
            expected, actual
        )));
    }

    xtea::decrypt(&mut body, key)?;
    let inner = u16::from_le_bytes([body[0], body[1]]) as usize;
    if LENGTH_SIZE + inner > body.len() {
        return Err(ProxyError::Framing(format!(
            "inner length {} exceeds decrypted payload of {} bytes",
            inner,
            body.len() - LENGTH_SIZE
        )));
    }
    body.truncate(LENGTH_SIZE + inner);
    body.drain(..LENGTH_SIZE);
    Ok(Message::from_bytes(body))
}

/// Recompute the Adler checksum of a complete frame in place
pub fn rewrite_checksum(buf: &mut [u8]) -> Result<()> {
    let header = LENGTH_SIZE + CHECKSUM_SIZE;
    if buf.len() < header {
        return Err(ProxyError::UnexpectedEof {
            needed: header,
            remaining: buf.len(),
        });
    }
    let checksum = adler_checksum(&buf[header..]);
    buf[LENGTH_SIZE..header].copy_from_slice(&checksum.to_le_bytes());
    Ok(())
}
