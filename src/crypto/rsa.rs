//! Raw RSA over the 128-byte key-exchange block
//!
//! The client encrypts its session key and credentials with the server's
//! public key. Patched clients use the well-known open key, whose private
//! exponent is compiled in here, so the proxy can read and rewrite the block.
//! No padding scheme is applied on purpose: the real peers use textbook RSA.

use num_bigint::BigUint;
use std::sync::LazyLock;

use crate::error::{ProxyError, Result};

/// Size of an RSA block on the wire
pub const BLOCK_SIZE: usize = 128;

/// Public exponent shared by both keys
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Open (OpenTibia) modulus
const OPEN_MODULUS: [u8; 128] = [
    0x9b, 0x64, 0x69, 0x03, 0xb4, 0x5b, 0x07, 0xac, 0x95, 0x65, 0x68, 0xd8, 0x73, 0x53, 0xbd, 0x71,
    0x65, 0x13, 0x9d, 0xd7, 0x94, 0x07, 0x03, 0xb0, 0x3e, 0x6d, 0xd0, 0x79, 0x39, 0x96, 0x61, 0xb4,
    0xa8, 0x37, 0xaa, 0x60, 0x56, 0x1d, 0x7c, 0xcb, 0x94, 0x52, 0xfa, 0x00, 0x80, 0x59, 0x49, 0x09,
    0x88, 0x2a, 0xb5, 0xbc, 0xa5, 0x8a, 0x1a, 0x1b, 0x35, 0xf8, 0xb1, 0x05, 0x9b, 0x72, 0xb1, 0x21,
    0x26, 0x11, 0xc6, 0x15, 0x2a, 0xd3, 0xdb, 0xb3, 0xcf, 0xbe, 0xe7, 0xad, 0xc1, 0x42, 0xa7, 0x5d,
    0x3d, 0x75, 0x97, 0x15, 0x09, 0xc3, 0x21, 0xc5, 0xc2, 0x4a, 0x5b, 0xd5, 0x1f, 0xd4, 0x60, 0xf0,
    0x1b, 0x4e, 0x15, 0xbe, 0xb0, 0xde, 0x19, 0x30, 0x52, 0x8a, 0x5d, 0x3f, 0x15, 0xc1, 0xe3, 0xcb,
    0xf5, 0xc4, 0x01, 0xd6, 0x77, 0x7e, 0x10, 0xac, 0xaa, 0xb3, 0x3d, 0xbe, 0x8d, 0x5b, 0x7f, 0xf5,
];

/// Open (OpenTibia) private exponent
const OPEN_PRIVATE_EXPONENT: [u8; 128] = [
    0x42, 0x8b, 0xd3, 0xb5, 0x34, 0x6d, 0xaf, 0x71, 0xa7, 0x61, 0x10, 0x6f, 0x71, 0xa4, 0x31, 0x02,
    0xf8, 0xc8, 0x57, 0xd6, 0x54, 0x9c, 0x54, 0x66, 0x0b, 0xb6, 0x37, 0x8b, 0x52, 0xb0, 0x26, 0x13,
    0x99, 0xde, 0x8c, 0xe6, 0x48, 0xba, 0xc4, 0x10, 0xe2, 0xea, 0x4e, 0x0a, 0x1c, 0xed, 0x1f, 0xac,
    0x27, 0x56, 0x33, 0x12, 0x20, 0xca, 0x6d, 0xb7, 0xad, 0x7b, 0x5d, 0x44, 0x0b, 0x78, 0x28, 0x86,
    0x58, 0x56, 0xe7, 0xaa, 0x6d, 0x8f, 0x45, 0x83, 0x7f, 0xee, 0xe9, 0xb4, 0xa3, 0xa0, 0xaa, 0x21,
    0x32, 0x2a, 0x1e, 0x2a, 0xb7, 0x5b, 0x18, 0x25, 0xe7, 0x86, 0xcf, 0x81, 0xa2, 0x8a, 0x8a, 0x09,
    0xa1, 0xe2, 0x85, 0x19, 0xdb, 0x64, 0xff, 0x9b, 0xaf, 0x31, 0x1e, 0x85, 0x0c, 0x2b, 0xfa, 0x1f,
    0xb7, 0xb0, 0x8a, 0x05, 0x6c, 0xc3, 0x37, 0xf7, 0xdf, 0x44, 0x37, 0x61, 0xae, 0xfe, 0x8d, 0x81,
];

/// Real server modulus (public part only)
const REAL_MODULUS: [u8; 128] = [
    0xbc, 0x27, 0xf9, 0x92, 0xa9, 0x6b, 0x8e, 0x2a, 0x43, 0xf4, 0xdf, 0xbe, 0x1c, 0xef, 0x8f, 0xd5,
    0x1c, 0xf4, 0x3d, 0x28, 0x03, 0xee, 0x34, 0xfb, 0xbd, 0x86, 0x34, 0xd8, 0xb4, 0xfa, 0x32, 0xf7,
    0xd9, 0xd9, 0xe1, 0x59, 0x97, 0x8d, 0xd2, 0x91, 0x56, 0xd6, 0x2f, 0x41, 0x53, 0xe9, 0xc5, 0x91,
    0x42, 0x63, 0xfc, 0x49, 0x86, 0x79, 0x7e, 0x12, 0x24, 0x5c, 0x1a, 0x6c, 0x45, 0x31, 0xef, 0xe4,
    0x8a, 0x6f, 0x7c, 0x2e, 0xff, 0xff, 0xf1, 0x8f, 0x2c, 0x9e, 0x1c, 0x50, 0x40, 0x31, 0xf3, 0xe4,
    0xa2, 0xc7, 0x88, 0xee, 0x96, 0x61, 0x8f, 0xff, 0xce, 0xc2, 0xc3, 0xe5, 0xbf, 0xaf, 0xaf, 0x74,
    0x3b, 0x3f, 0xc7, 0xa8, 0x72, 0xee, 0x60, 0xa5, 0x2c, 0x29, 0xaa, 0x68, 0x8b, 0xda, 0xf8, 0x69,
    0x23, 0x05, 0x31, 0x28, 0x82, 0xf1, 0xf6, 0x6e, 0xe9, 0xd8, 0xae, 0xb7, 0xf8, 0x4b, 0x19, 0x49,
];

static OPEN_N: LazyLock<BigUint> = LazyLock::new(|| BigUint::from_bytes_be(&OPEN_MODULUS));
static OPEN_D: LazyLock<BigUint> =
    LazyLock::new(|| BigUint::from_bytes_be(&OPEN_PRIVATE_EXPONENT));
static REAL_N: LazyLock<BigUint> = LazyLock::new(|| BigUint::from_bytes_be(&REAL_MODULUS));
static E: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(PUBLIC_EXPONENT));

/// Which public key the proxy encrypts with when talking to a real server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaKey {
    /// Open test key; the proxy can decrypt what it sends
    #[default]
    Open,
    /// Key of the official servers (public part only)
    Real,
}

impl RsaKey {
    /// Select the key from the "real protocol" configuration flag
    pub fn from_real_flag(real: bool) -> Self {
        if real {
            RsaKey::Real
        } else {
            RsaKey::Open
        }
    }

    pub fn modulus(self) -> &'static BigUint {
        match self {
            RsaKey::Open => open_modulus(),
            RsaKey::Real => real_modulus(),
        }
    }

    /// Encrypt a block for this key with the public exponent
    pub fn encrypt(self, block: &[u8]) -> Result<Vec<u8>> {
        encrypt(block, self.modulus(), public_exponent())
    }
}

impl std::fmt::Display for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RsaKey::Open => write!(f, "open"),
            RsaKey::Real => write!(f, "real"),
        }
    }
}

pub fn open_modulus() -> &'static BigUint {
    &OPEN_N
}

pub fn real_modulus() -> &'static BigUint {
    &REAL_N
}

pub fn public_exponent() -> &'static BigUint {
    &E
}

fn check_block(block: &[u8]) -> Result<()> {
    if block.len() != BLOCK_SIZE {
        return Err(ProxyError::Handshake(format!(
            "RSA block must be {} bytes, got {}",
            BLOCK_SIZE,
            block.len()
        )));
    }
    Ok(())
}

/// Serialize `value` big-endian, left-padded with zeros to `width` bytes
fn to_fixed_width(value: &BigUint, width: usize) -> Result<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes.len() > width {
        return Err(ProxyError::Handshake(format!(
            "RSA result of {} bytes does not fit a {} byte block",
            bytes.len(),
            width
        )));
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn modpow_block(block: &[u8], exponent: &BigUint, modulus: &BigUint) -> Result<Vec<u8>> {
    check_block(block)?;
    let value = BigUint::from_bytes_be(block);
    to_fixed_width(&value.modpow(exponent, modulus), block.len())
}

/// Decrypt a block with the open private exponent: `c^d mod n`
pub fn decrypt(block: &[u8], modulus: &BigUint) -> Result<Vec<u8>> {
    modpow_block(block, &OPEN_D, modulus)
}

/// Encrypt a block: `m^e mod n`
pub fn encrypt(block: &[u8], modulus: &BigUint, exponent: &BigUint) -> Result<Vec<u8>> {
    modpow_block(block, exponent, modulus)
}
