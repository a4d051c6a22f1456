//! RSA block handling shared by the login and game first messages
//!
//! Both first messages are `clear header | 128-byte RSA block | trailer`.
//! The decrypted block starts with a zero byte that keeps the integer below
//! the modulus; everything after it is protocol data.

use super::frame::rewrite_checksum;
use crate::crypto::rsa::{self, RsaKey, BLOCK_SIZE};
use crate::error::{ProxyError, Result};

/// Decrypt the RSA block at `offset` with the open key
///
/// Returns the full 128-byte plaintext, leading zero included.
pub fn open_block(raw: &[u8], offset: usize) -> Result<Vec<u8>> {
    let end = offset + BLOCK_SIZE;
    if raw.len() < end {
        return Err(ProxyError::UnexpectedEof {
            needed: end,
            remaining: raw.len(),
        });
    }
    let plaintext = rsa::decrypt(&raw[offset..end], rsa::open_modulus())?;
    if plaintext[0] != 0 {
        return Err(ProxyError::Handshake(format!(
            "RSA block decrypts to leading byte {:#04x}; client is not using the open key",
            plaintext[0]
        )));
    }
    Ok(plaintext)
}

/// Re-encrypt `plaintext` with `key` and splice it over the block at `offset`
///
/// Header and trailer bytes are kept as they are; the checksum is recomputed.
pub fn seal_block(raw: &[u8], offset: usize, plaintext: &[u8], key: RsaKey) -> Result<Vec<u8>> {
    let end = offset + BLOCK_SIZE;
    if raw.len() < end {
        return Err(ProxyError::UnexpectedEof {
            needed: end,
            remaining: raw.len(),
        });
    }
    let block = key.encrypt(plaintext)?;
    let mut out = raw.to_vec();
    out[offset..end].copy_from_slice(&block);
    rewrite_checksum(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::adler_checksum;

    fn plaintext() -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_SIZE];
        for (i, b) in block.iter_mut().enumerate().skip(1) {
            *b = (i * 3) as u8;
        }
        block
    }

    fn first_message(header: usize) -> Vec<u8> {
        let mut raw = vec![0xEE; header];
        raw.extend_from_slice(&RsaKey::Open.encrypt(&plaintext()).unwrap());
        raw.extend_from_slice(&[0x01, 0x02, 0x03]);
        let declared = (raw.len() - 2) as u16;
        raw[..2].copy_from_slice(&declared.to_le_bytes());
        rewrite_checksum(&mut raw).unwrap();
        raw
    }

    #[test]
    fn test_open_block_recovers_plaintext() {
        let raw = first_message(16);
        assert_eq!(open_block(&raw, 16).unwrap(), plaintext());
    }

    #[test]
    fn test_open_block_short_message() {
        let raw = vec![0u8; 100];
        assert!(matches!(
            open_block(&raw, 16),
            Err(ProxyError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_open_block_rejects_foreign_key() {
        // A block encrypted for the real key decrypts to noise under the open key
        let mut raw = vec![0u8; 16];
        raw.extend_from_slice(&RsaKey::Real.encrypt(&plaintext()).unwrap());
        match open_block(&raw, 16) {
            Err(ProxyError::Handshake(_)) => {}
            Ok(block) => assert_ne!(block, plaintext()),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_seal_block_keeps_header_and_trailer() {
        let raw = first_message(28);
        let mut patched = plaintext();
        patched[10] = 0xAB;
        let out = seal_block(&raw, 28, &patched, RsaKey::Open).unwrap();

        assert_eq!(out.len(), raw.len());
        assert_eq!(&out[..2], &raw[..2]);
        assert_eq!(&out[6..28], &raw[6..28]);
        assert_eq!(&out[156..], &raw[156..]);
        assert_eq!(open_block(&out, 28).unwrap(), patched);
        let checksum = u32::from_le_bytes([out[2], out[3], out[4], out[5]]);
        assert_eq!(checksum, adler_checksum(&out[6..]));
    }

    #[test]
    fn test_seal_block_with_real_key() {
        let raw = first_message(16);
        let out = seal_block(&raw, 16, &plaintext(), RsaKey::Real).unwrap();
        assert_ne!(&out[16..144], &raw[16..144]);
        let expected = RsaKey::Real.encrypt(&plaintext()).unwrap();
        assert_eq!(&out[16..144], expected.as_slice());
    }
}
