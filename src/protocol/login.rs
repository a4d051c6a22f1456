//! Login protocol
//!
//! One round trip: the client's first message carries the session key in its
//! RSA block, the login server answers with one XTEA frame. When that frame is
//! a character list the proxy rebuilds it with its own announce address in
//! place of every world endpoint.

use std::fmt;

use super::frame::decrypt_frame;
use super::handshake::{open_block, seal_block};
use super::message::Message;
use crate::crypto::{RsaKey, SessionKey};
use crate::error::{ProxyError, Result};

/// Clear bytes before the RSA block in the client's first message
pub const LOGIN_HEADER_SIZE: usize = 28;

/// Message of the day, optional prefix of a character list
pub const OPCODE_MOTD: u8 = 0x14;

/// Character list marker
pub const OPCODE_CHARACTER_LIST: u8 = 0x64;

/// Parsed client login request
pub struct LoginRequest {
    pub key: SessionKey,
    pub account: Option<String>,
    pub character: Option<String>,
    password: Option<String>,
    raw: Vec<u8>,
    plaintext: Vec<u8>,
}

impl LoginRequest {
    /// Parse the client's first frame, length prefix included
    ///
    /// Only the session key is required. Clients differ in which credential
    /// strings follow it, so those are read as far as they go.
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        let plaintext = open_block(&raw, LOGIN_HEADER_SIZE)?;
        let mut msg = Message::from_bytes(&plaintext[1..]);
        let key = SessionKey::new([
            msg.get_u32()?,
            msg.get_u32()?,
            msg.get_u32()?,
            msg.get_u32()?,
        ]);
        let account = msg.get_string().ok();
        let character = account.as_ref().and_then(|_| msg.get_string().ok());
        let password = character.as_ref().and_then(|_| msg.get_string().ok());

        Ok(Self {
            key,
            account,
            character,
            password,
            raw,
            plaintext,
        })
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Bytes to send to the real login server
    pub fn upstream_bytes(&self, key: RsaKey) -> Result<Vec<u8>> {
        match key {
            RsaKey::Open => Ok(self.raw.clone()),
            RsaKey::Real => seal_block(&self.raw, LOGIN_HEADER_SIZE, &self.plaintext, key),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("account", &self.account)
            .field("character", &self.character)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("len", &self.raw.len())
            .finish()
    }
}

/// One game world as announced by the login server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginWorldEntry {
    pub id: u8,
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub preview_state: u8,
}

/// A character and the index of its world in the same list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCharacterEntry {
    pub name: String,
    pub world: usize,
}

/// Decoded character list reply
///
/// Worlds and characters are only built together by `parse`, so every
/// character's world index is valid for the lifetime of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterList {
    motd: Option<String>,
    worlds: Vec<LoginWorldEntry>,
    characters: Vec<LoginCharacterEntry>,
    trailer: Vec<u8>,
}

impl CharacterList {
    /// Parse a decrypted reply payload
    ///
    /// `Ok(None)` means the payload is some other reply (an error, a wait
    /// notice) that must be forwarded untouched.
    pub fn parse(msg: &mut Message) -> Result<Option<Self>> {
        if msg.remaining() == 0 {
            return Ok(None);
        }
        let mut opcode = msg.get_byte()?;
        let mut motd = None;
        if opcode == OPCODE_MOTD {
            motd = Some(msg.get_string()?);
            if msg.remaining() == 0 {
                return Ok(None);
            }
            opcode = msg.get_byte()?;
        }
        if opcode != OPCODE_CHARACTER_LIST {
            return Ok(None);
        }

        let world_count = msg.get_byte()?;
        let mut worlds = Vec::with_capacity(world_count as usize);
        for _ in 0..world_count {
            worlds.push(LoginWorldEntry {
                id: msg.get_byte()?,
                name: msg.get_string()?,
                hostname: msg.get_string()?,
                port: msg.get_u16()?,
                preview_state: msg.get_byte()?,
            });
        }

        let char_count = msg.get_byte()?;
        let mut characters = Vec::with_capacity(char_count as usize);
        for _ in 0..char_count {
            let world_id = msg.get_byte()?;
            let name = msg.get_string()?;
            let world = worlds
                .iter()
                .position(|w| w.id == world_id)
                .ok_or_else(|| {
                    ProxyError::Handshake(format!(
                        "character {:?} refers to unknown world id {}",
                        name, world_id
                    ))
                })?;
            characters.push(LoginCharacterEntry { name, world });
        }

        Ok(Some(Self {
            motd,
            worlds,
            characters,
            trailer: msg.rest().to_vec(),
        }))
    }

    pub fn motd(&self) -> Option<&str> {
        self.motd.as_deref()
    }

    pub fn worlds(&self) -> &[LoginWorldEntry] {
        &self.worlds
    }

    pub fn characters(&self) -> &[LoginCharacterEntry] {
        &self.characters
    }

    pub fn world_of(&self, character: &LoginCharacterEntry) -> &LoginWorldEntry {
        &self.worlds[character.world]
    }

    /// Each character paired with its world
    pub fn routes(&self) -> impl Iterator<Item = (&str, &LoginWorldEntry)> + '_ {
        self.characters
            .iter()
            .map(move |c| (c.name.as_str(), self.world_of(c)))
    }

    /// Copy with every world endpoint replaced by the announce address
    pub fn with_announce(&self, host: &str, port: u16) -> Self {
        let mut out = self.clone();
        for world in &mut out.worlds {
            world.hostname = host.to_string();
            world.port = port;
        }
        out
    }

    pub fn encode(&self) -> Result<Message> {
        let mut msg = Message::new();
        if let Some(motd) = &self.motd {
            msg.add_byte(OPCODE_MOTD);
            msg.add_string(motd)?;
        }
        msg.add_byte(OPCODE_CHARACTER_LIST);
        msg.add_byte(self.worlds.len() as u8);
        for world in &self.worlds {
            msg.add_byte(world.id);
            msg.add_string(&world.name)?;
            msg.add_string(&world.hostname)?;
            msg.add_u16(world.port);
            msg.add_byte(world.preview_state);
        }
        msg.add_byte(self.characters.len() as u8);
        for character in &self.characters {
            msg.add_byte(self.worlds[character.world].id);
            msg.add_string(&character.name)?;
        }
        msg.add_bytes(&self.trailer);
        Ok(msg)
    }

    pub fn to_frame(&self, key: &SessionKey) -> Result<Vec<u8>> {
        self.encode()?.encrypted_frame(key)
    }
}

/// What the login server answered
#[derive(Debug)]
pub enum LoginReply {
    CharacterList(CharacterList),
    /// Anything else; forwarded byte-for-byte
    Other,
}

/// Decrypt and classify a login server reply frame
pub fn parse_reply(raw: &[u8], key: &SessionKey) -> Result<LoginReply> {
    let mut msg = decrypt_frame(raw, key)?;
    Ok(match CharacterList::parse(&mut msg)? {
        Some(list) => LoginReply::CharacterList(list),
        None => LoginReply::Other,
    })
}
