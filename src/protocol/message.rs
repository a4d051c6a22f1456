//! Network message codec
//!
//! A `Message` is an owned byte buffer with a read cursor. Reads consume from
//! the cursor and fail with `UnexpectedEof` instead of panicking; writes
//! append. All integers are little-endian and strings are u16-length-prefixed
//! Latin-1.

use crate::crypto::{xtea, SessionKey};
use crate::error::{ProxyError, Result};

/// Filler byte used to align a payload to the XTEA block size
pub const PADDING_BYTE: u8 = 0x33;

/// Size of the outer length prefix
pub const LENGTH_SIZE: usize = 2;

/// Size of the Adler-32 checksum that follows the outer length
pub const CHECKSUM_SIZE: usize = 4;

const ADLER_MOD: u32 = 65521;
// Largest n such that 255n(n+1)/2 + (n+1)(ADLER_MOD-1) fits in u32
const ADLER_NMAX: usize = 5552;

/// Adler-32 checksum as used in the frame header
pub fn adler_checksum(buf: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for chunk in buf.chunks(ADLER_NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }
    (b << 16) | a
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    buf: Vec<u8>,
    pos: usize,
}

impl Message {
    /// Empty message for writing
    pub fn new() -> Self {
        Self::default()
    }

    /// Message over existing bytes, cursor at the start
    pub fn from_bytes(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Raw bytes, ignoring the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProxyError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..start + n])
    }

    pub fn get_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Next `n` bytes as an owned buffer
    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn get_string(&mut self) -> Result<String> {
        let len = self.get_u16()? as usize;
        Ok(self.take(len)?.iter().map(|&b| char::from(b)).collect())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Consume and return everything after the cursor
    pub fn rest(&mut self) -> &[u8] {
        let start = self.pos;
        self.pos = self.buf.len();
        &self.buf[start..]
    }

    pub fn add_byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a length-prefixed string. Characters outside Latin-1 become `?`.
    pub fn add_string(&mut self, value: &str) -> Result<()> {
        let encoded: Vec<u8> = value
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        self.add_u16(length_prefix(encoded.len(), "string")?);
        self.buf.extend_from_slice(&encoded);
        Ok(())
    }

    /// `u16 len | payload`, right-padded with `padding` to a multiple of 8
    pub fn with_header(&self, padding: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(LENGTH_SIZE + self.buf.len() + xtea::BLOCK_SIZE);
        out.extend_from_slice(&length_prefix(self.buf.len(), "payload")?.to_le_bytes());
        out.extend_from_slice(&self.buf);
        let rem = out.len() % xtea::BLOCK_SIZE;
        if rem != 0 {
            out.resize(out.len() + xtea::BLOCK_SIZE - rem, padding);
        }
        Ok(out)
    }

    /// Complete encrypted wire frame: `u16 len | u32 adler | xtea(with_header)`
    pub fn encrypted_frame(&self, key: &SessionKey) -> Result<Vec<u8>> {
        let mut payload = self.with_header(PADDING_BYTE)?;
        xtea::encrypt(&mut payload, key)?;
        seal(&payload)
    }

    /// Complete unencrypted wire frame: `u16 len | u32 adler | u16 inner | payload`
    pub fn plain_frame(&self) -> Result<Vec<u8>> {
        let mut inner = Vec::with_capacity(LENGTH_SIZE + self.buf.len());
        inner.extend_from_slice(&length_prefix(self.buf.len(), "payload")?.to_le_bytes());
        inner.extend_from_slice(&self.buf);
        seal(&inner)
    }
}

/// Checked u16 length prefix
fn length_prefix(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        ProxyError::Framing(format!(
            "{} of {} bytes exceeds the {} byte limit",
            what,
            len,
            u16::MAX
        ))
    })
}

/// Prepend checksum then outer length to a frame body
fn seal(body: &[u8]) -> Result<Vec<u8>> {
    let outer = length_prefix(CHECKSUM_SIZE + body.len(), "frame")?;
    let mut out = Vec::with_capacity(LENGTH_SIZE + CHECKSUM_SIZE + body.len());
    out.extend_from_slice(&outer.to_le_bytes());
    out.extend_from_slice(&adler_checksum(body).to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}
