//! Man-in-the-middle proxy for the Tibia login and game protocols
//!
//! Architecture:
//! - `crypto/`: XTEA session cipher and raw RSA with the open and real keys
//! - `protocol/`: message codec, framing and the login/game handshakes
//! - `core/`: routing table, game relay and chat plugin hooks
//! - `handler`: login and game connection state machines
//! - `server_runner`: listener binding and accept loops

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod logger;
pub mod plugins;
pub mod protocol;
pub mod server_runner;

pub use error::{ProxyError, Result, StepContext};
