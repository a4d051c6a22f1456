//! Hook traits for extensibility
//!
//! Chat plugins see every client talk packet before it is forwarded and may
//! swallow it. The relay calls them in registration order through
//! `PluginRegistry`; the first one that reports the text as handled wins.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::crypto::SessionKey;
use crate::error::Result;
use crate::protocol::{build_server_talk, Message, Position};

/// Plugin invoked on client chat
#[async_trait]
pub trait ChatPlugin: Send + Sync {
    /// Short name used in configuration and logs
    fn name(&self) -> &str;

    /// Called with the spoken text. Return `true` to keep the packet from
    /// reaching the server; any reply is the plugin's job.
    async fn on_client_say(&self, conn: &mut ClientHandle<'_>, text: &str) -> bool;
}

/// Client side of a relayed game connection, as seen by plugins
pub struct ClientHandle<'a> {
    writer: &'a mut (dyn AsyncWrite + Unpin + Send),
    key: SessionKey,
    character: &'a str,
    peer: SocketAddr,
}

impl<'a> ClientHandle<'a> {
    pub fn new(
        writer: &'a mut (dyn AsyncWrite + Unpin + Send),
        key: SessionKey,
        character: &'a str,
        peer: SocketAddr,
    ) -> Self {
        Self {
            writer,
            key,
            character,
            peer,
        }
    }

    pub fn character(&self) -> &str {
        self.character
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Encrypt and send a server-originated message to the client
    pub async fn send_message(&mut self, msg: &Message) -> Result<()> {
        let frame = msg.encrypted_frame(&self.key)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Show `text` in the client as said by `speaker` at `pos`
    pub async fn send_chat(
        &mut self,
        speaker: &str,
        level: u16,
        pos: Position,
        text: &str,
    ) -> Result<()> {
        self.send_message(&build_server_talk(speaker, level, pos, text)?)
            .await
    }
}

/// Ordered set of chat plugins
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ChatPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn ChatPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Offer `text` to each plugin in order. Returns the name of the plugin
    /// that handled it, if any.
    pub async fn dispatch_say(&self, conn: &mut ClientHandle<'_>, text: &str) -> Option<String> {
        for plugin in &self.plugins {
            if plugin.on_client_say(conn, text).await {
                return Some(plugin.name().to_string());
            }
        }
        None
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
