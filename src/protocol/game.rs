//! Game protocol handshake and talk packets
//!
//! The game server speaks first with an unencrypted challenge. The client
//! echoes it inside its RSA block, so the proxy has to issue its own
//! challenge, then patch the real server's values into the client's block
//! before forwarding it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::frame::decrypt_frame;
use super::handshake::{open_block, seal_block};
use super::message::{adler_checksum, Message, CHECKSUM_SIZE, LENGTH_SIZE};
use super::opcodes::{CLIENT_TALK, SERVER_CHALLENGE, SERVER_TALK};
use crate::crypto::{RsaKey, SessionKey};
use crate::error::{ProxyError, Result};

/// Clear bytes before the RSA block in the client's first game message
pub const GAME_HEADER_SIZE: usize = 16;

/// Inner length of a challenge: opcode, u32 timestamp, u8 nonce
const CHALLENGE_INNER_LEN: u16 = 6;

// Talk types that carry extra fields before the text
pub const TALK_SAY: u8 = 1;
pub const TALK_PRIVATE_TO: u8 = 5;
pub const TALK_CHANNEL_Y: u8 = 7;
pub const TALK_CHANNEL_R1: u8 = 14;
pub const TALK_PRIVATE_RED_TO: u8 = 16;

/// Timestamp and nonce a game server sends before login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    pub timestamp: u32,
    pub nonce: u8,
}

impl Challenge {
    pub fn new(timestamp: u32, nonce: u8) -> Self {
        Self { timestamp, nonce }
    }

    /// Fresh challenge from the wall clock and a random nonce
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        Self {
            timestamp,
            nonce: rand::random(),
        }
    }

    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let mut msg = Message::new();
        msg.add_byte(SERVER_CHALLENGE);
        msg.add_u32(self.timestamp);
        msg.add_byte(self.nonce);
        msg.plain_frame()
    }

    /// Parse a challenge frame, length prefix included
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut msg = Message::from_bytes(raw);
        let declared = msg.get_u16()? as usize;
        if declared != raw.len() - LENGTH_SIZE {
            return Err(ProxyError::Framing(format!(
                "challenge declares {} bytes but {} follow",
                declared,
                raw.len() - LENGTH_SIZE
            )));
        }
        let checksum = msg.get_u32()?;
        if checksum != adler_checksum(&raw[LENGTH_SIZE + CHECKSUM_SIZE..]) {
            return Err(ProxyError::Handshake(
                "challenge checksum mismatch".to_string(),
            ));
        }
        let inner = msg.get_u16()?;
        if inner != CHALLENGE_INNER_LEN {
            return Err(ProxyError::Handshake(format!(
                "challenge inner length {} (expected {})",
                inner, CHALLENGE_INNER_LEN
            )));
        }
        let opcode = msg.get_byte()?;
        if opcode != SERVER_CHALLENGE {
            return Err(ProxyError::Handshake(format!(
                "expected challenge opcode {:#04x}, got {:#04x}",
                SERVER_CHALLENGE, opcode
            )));
        }
        Ok(Self {
            timestamp: msg.get_u32()?,
            nonce: msg.get_byte()?,
        })
    }
}

/// Parsed client first message on the game port
pub struct GameLogin {
    pub key: SessionKey,
    pub account: String,
    pub character: String,
    password: String,
    /// Challenge values the client echoed back
    pub echoed: Challenge,
    /// Offset of the echoed timestamp within the decrypted block
    challenge_pos: usize,
    raw: Vec<u8>,
    plaintext: Vec<u8>,
}

impl GameLogin {
    /// Parse the client's first game frame, length prefix included
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        let plaintext = open_block(&raw, GAME_HEADER_SIZE)?;
        // Skip the zero byte
        let mut msg = Message::from_bytes(&plaintext[1..]);
        let key = SessionKey::new([
            msg.get_u32()?,
            msg.get_u32()?,
            msg.get_u32()?,
            msg.get_u32()?,
        ]);
        let gamemaster = msg.get_byte()?;
        if gamemaster != 0 {
            return Err(ProxyError::Handshake(format!(
                "gamemaster flag is {}",
                gamemaster
            )));
        }
        let account = msg.get_string()?;
        let character = msg.get_string()?;
        let password = msg.get_string()?;
        let challenge_pos = 1 + msg.position();
        let echoed = Challenge {
            timestamp: msg.get_u32()?,
            nonce: msg.get_byte()?,
        };

        Ok(Self {
            key,
            account,
            character,
            password,
            echoed,
            challenge_pos,
            raw,
            plaintext,
        })
    }

    pub fn challenge_pos(&self) -> usize {
        self.challenge_pos
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Client message with `challenge` patched in, re-encrypted with `key`
    pub fn forward_with(&self, challenge: &Challenge, key: RsaKey) -> Result<Vec<u8>> {
        let mut plaintext = self.plaintext.clone();
        let pos = self.challenge_pos;
        plaintext[pos..pos + 4].copy_from_slice(&challenge.timestamp.to_le_bytes());
        plaintext[pos + 4] = challenge.nonce;
        seal_block(&self.raw, GAME_HEADER_SIZE, &plaintext, key)
    }
}

impl fmt::Debug for GameLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLogin")
            .field("account", &self.account)
            .field("character", &self.character)
            .field("password", &"<redacted>")
            .field("echoed", &self.echoed)
            .field("challenge_pos", &self.challenge_pos)
            .finish()
    }
}

/// Decrypted client talk packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTalk {
    pub kind: u8,
    pub receiver: Option<String>,
    pub channel: Option<u16>,
    pub text: String,
}

impl ClientTalk {
    /// Parse from a message positioned right after the talk opcode
    pub fn parse(msg: &mut Message) -> Result<Self> {
        let kind = msg.get_byte()?;
        let mut receiver = None;
        let mut channel = None;
        match kind {
            TALK_PRIVATE_TO | TALK_PRIVATE_RED_TO => receiver = Some(msg.get_string()?),
            TALK_CHANNEL_Y | TALK_CHANNEL_R1 => channel = Some(msg.get_u16()?),
            _ => {}
        }
        Ok(Self {
            kind,
            receiver,
            channel,
            text: msg.get_string()?,
        })
    }

    /// Decrypt a client frame and return its talk payload, if it is one
    pub fn from_frame(raw: &[u8], key: &SessionKey) -> Result<Option<Self>> {
        let mut msg = decrypt_frame(raw, key)?;
        if msg.get_byte()? != CLIENT_TALK {
            return Ok(None);
        }
        Self::parse(&mut msg).map(Some)
    }

    pub fn encode(&self) -> Result<Message> {
        let mut msg = Message::new();
        msg.add_byte(CLIENT_TALK);
        msg.add_byte(self.kind);
        if let Some(receiver) = &self.receiver {
            msg.add_string(receiver)?;
        }
        if let Some(channel) = self.channel {
            msg.add_u16(channel);
        }
        msg.add_string(&self.text)?;
        Ok(msg)
    }
}

/// Map position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl Position {
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Server talk packet shown to the client as `speaker` saying `text`
pub fn build_server_talk(
    speaker: &str,
    level: u16,
    pos: Position,
    text: &str,
) -> Result<Message> {
    let mut msg = Message::new();
    msg.add_byte(SERVER_TALK);
    msg.add_u32(0);
    msg.add_string(speaker)?;
    msg.add_u16(level);
    msg.add_byte(TALK_SAY);
    msg.add_u16(pos.x);
    msg.add_u16(pos.y);
    msg.add_byte(pos.z);
    msg.add_string(text)?;
    Ok(msg)
}
