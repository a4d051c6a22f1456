//! Crypto primitives used by the protocol
//!
//! Both ciphers target wire compatibility with the real client and servers:
//! - `rsa`: raw (unpadded) 1024-bit RSA over the 128-byte key-exchange block
//! - `xtea`: 32-round XTEA over 8-byte little-endian blocks
//!
//! All functions are stateless and take their key material explicitly.

pub mod rsa;
pub mod xtea;

pub use rsa::RsaKey;
pub use xtea::SessionKey;
