//! Wire protocol
//!
//! - `message`: cursor codec, checksum and frame builders
//! - `frame`: frame splitting and frame-level decryption
//! - `handshake`: RSA block open/seal shared by both first messages
//! - `login` / `game`: per-protocol message layouts
//! - `opcodes`: opcode names for logging

pub mod frame;
pub mod game;
pub mod handshake;
pub mod login;
pub mod message;
pub mod opcodes;

pub use frame::{decrypt_frame, read_frame, rewrite_checksum, FrameCodec};
pub use game::{build_server_talk, Challenge, ClientTalk, GameLogin, Position};
pub use login::{CharacterList, LoginCharacterEntry, LoginReply, LoginRequest, LoginWorldEntry};
pub use message::{adler_checksum, Message};
pub use opcodes::Direction;
