//! XTEA block cipher
//!
//! Every post-handshake frame is encrypted with the session key the client
//! chose in its RSA block. Blocks are two little-endian `u32` words.

use crate::error::{ProxyError, Result};

/// XTEA block size in bytes
pub const BLOCK_SIZE: usize = 8;

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;

/// Four-word XTEA key negotiated once per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionKey([u32; 4]);

impl SessionKey {
    pub fn new(words: [u32; 4]) -> Self {
        Self(words)
    }

    pub fn words(&self) -> [u32; 4] {
        self.0
    }

    #[inline]
    fn word(&self, index: u32) -> u32 {
        self.0[(index & 3) as usize]
    }
}

impl From<[u32; 4]> for SessionKey {
    fn from(words: [u32; 4]) -> Self {
        Self(words)
    }
}

fn check_len(buf: &[u8]) -> Result<()> {
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(ProxyError::Framing(format!(
            "XTEA buffer length {} is not a multiple of {}",
            buf.len(),
            BLOCK_SIZE
        )));
    }
    Ok(())
}

#[inline]
fn load(block: &[u8]) -> (u32, u32) {
    let v0 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    let v1 = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    (v0, v1)
}

#[inline]
fn store(block: &mut [u8], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_le_bytes());
    block[4..].copy_from_slice(&v1.to_le_bytes());
}

#[inline]
fn mix(v: u32) -> u32 {
    ((v << 4) ^ (v >> 5)).wrapping_add(v)
}

/// Encrypt `buf` in place. The length must be a multiple of 8.
pub fn encrypt(buf: &mut [u8], key: &SessionKey) -> Result<()> {
    check_len(buf)?;
    for block in buf.chunks_exact_mut(BLOCK_SIZE) {
        let (mut v0, mut v1) = load(block);
        let mut sum: u32 = 0;
        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(mix(v1) ^ sum.wrapping_add(key.word(sum)));
            sum = sum.wrapping_add(DELTA);
            v1 = v1.wrapping_add(mix(v0) ^ sum.wrapping_add(key.word(sum >> 11)));
        }
        store(block, v0, v1);
    }
    Ok(())
}

/// Decrypt `buf` in place. The length must be a multiple of 8.
pub fn decrypt(buf: &mut [u8], key: &SessionKey) -> Result<()> {
    check_len(buf)?;
    for block in buf.chunks_exact_mut(BLOCK_SIZE) {
        let (mut v0, mut v1) = load(block);
        let mut sum: u32 = DELTA.wrapping_mul(ROUNDS);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(mix(v0) ^ sum.wrapping_add(key.word(sum >> 11)));
            sum = sum.wrapping_sub(DELTA);
            v0 = v0.wrapping_sub(mix(v1) ^ sum.wrapping_add(key.word(sum)));
        }
        store(block, v0, v1);
    }
    Ok(())
}
