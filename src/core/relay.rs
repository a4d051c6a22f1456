//! Bidirectional frame relay for established game sessions
//!
//! Both sockets are read through `FramedRead` so a frame half-read when the
//! other side wins the `select!` stays buffered. Frames are forwarded as the
//! original ciphertext; decryption is only for inspection.

use futures_util::StreamExt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::hooks::{ClientHandle, PluginRegistry};
use crate::crypto::SessionKey;
use crate::error::{Result, StepContext};
use crate::logger::log;
use crate::protocol::opcodes::{Direction, CLIENT_TALK};
use crate::protocol::{decrypt_frame, ClientTalk, FrameCodec};

/// Bytes of a frame shown in malformed-frame log lines
const PREVIEW_LEN: usize = 16;

/// Frame counters for one relayed session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames read from the client
    pub client_frames: u64,
    /// Frames read from the real server
    pub server_frames: u64,
    /// Client frames a plugin kept from the server
    pub suppressed: u64,
    /// Client frames that failed to decrypt or parse and went through as-is
    pub malformed: u64,
}

/// What to do with a client frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    Forward,
    Suppress,
}

/// Per-session data the relay needs besides the sockets
#[derive(Debug, Clone, Copy)]
pub struct RelayContext<'a> {
    pub key: SessionKey,
    pub character: &'a str,
    pub peer: SocketAddr,
    pub plugins: &'a PluginRegistry,
}

/// Relay frames until either side closes or `shutdown` fires
pub async fn relay_game_session<C, U>(
    client: C,
    upstream: U,
    ctx: RelayContext<'_>,
    shutdown: CancellationToken,
) -> Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    U: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (client_read, mut client_write) = tokio::io::split(client);
    let (upstream_read, mut upstream_write) = tokio::io::split(upstream);
    let mut client_frames = FramedRead::new(client_read, FrameCodec::new());
    let mut server_frames = FramedRead::new(upstream_read, FrameCodec::new());
    let mut stats = RelayStats::default();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::debug!(peer = %ctx.peer, "Relay cancelled by shutdown");
                break;
            }
            frame = client_frames.next() => {
                let Some(frame) = frame else {
                    log::debug!(peer = %ctx.peer, character = ctx.character, "Client closed");
                    break;
                };
                let frame = frame.client_step("read client frame")?;
                stats.client_frames += 1;
                match inspect_client_frame(&frame, &ctx, &mut client_write, &mut stats).await {
                    FrameAction::Forward => {
                        upstream_write
                            .write_all(&frame)
                            .await
                            .upstream_step("forward client frame")?;
                    }
                    FrameAction::Suppress => stats.suppressed += 1,
                }
            }
            frame = server_frames.next() => {
                let Some(frame) = frame else {
                    log::debug!(peer = %ctx.peer, character = ctx.character, "Server closed");
                    break;
                };
                let frame = frame.upstream_step("read server frame")?;
                stats.server_frames += 1;
                if log::enabled!(log::Level::TRACE) {
                    trace_server_frame(&frame, &ctx);
                }
                client_write
                    .write_all(&frame)
                    .await
                    .client_step("send server frame")?;
            }
        }
    }

    let _ = upstream_write.shutdown().await;
    let _ = client_write.shutdown().await;
    Ok(stats)
}

/// Decrypt a client frame, classify it and offer talk to the plugins
async fn inspect_client_frame<W>(
    frame: &[u8],
    ctx: &RelayContext<'_>,
    client_write: &mut W,
    stats: &mut RelayStats,
) -> FrameAction
where
    W: AsyncWrite + Unpin + Send,
{
    let mut msg = match decrypt_frame(frame, &ctx.key) {
        Ok(msg) => msg,
        Err(e) => {
            stats.malformed += 1;
            log::warn!(
                peer = %ctx.peer,
                len = frame.len(),
                head = %frame_preview(frame),
                error = %e,
                "Malformed client frame passed through"
            );
            return FrameAction::Forward;
        }
    };
    let opcode = match msg.get_byte() {
        Ok(opcode) => opcode,
        Err(e) => {
            stats.malformed += 1;
            log::warn!(
                peer = %ctx.peer,
                len = frame.len(),
                head = %frame_preview(frame),
                error = %e,
                "Empty client frame passed through"
            );
            return FrameAction::Forward;
        }
    };
    log::trace!(
        peer = %ctx.peer,
        direction = %Direction::Upstream,
        opcode = %format!("{:#04x}", opcode),
        name = Direction::Upstream.opcode_name(opcode).unwrap_or("unknown"),
        "Frame"
    );
    if opcode != CLIENT_TALK || ctx.plugins.is_empty() {
        return FrameAction::Forward;
    }

    let talk = match ClientTalk::parse(&mut msg) {
        Ok(talk) => talk,
        Err(e) => {
            stats.malformed += 1;
            log::warn!(peer = %ctx.peer, error = %e, "Malformed talk packet passed through");
            return FrameAction::Forward;
        }
    };
    log::debug!(
        peer = %ctx.peer,
        character = ctx.character,
        talk_type = talk.kind,
        text = %talk.text,
        "Client said"
    );

    let mut conn = ClientHandle::new(client_write, ctx.key, ctx.character, ctx.peer);
    match ctx.plugins.dispatch_say(&mut conn, &talk.text).await {
        Some(plugin) => {
            log::debug!(peer = %ctx.peer, plugin = %plugin, "Chat handled by plugin");
            FrameAction::Suppress
        }
        None => FrameAction::Forward,
    }
}

fn trace_server_frame(frame: &[u8], ctx: &RelayContext<'_>) {
    match decrypt_frame(frame, &ctx.key).and_then(|mut msg| msg.get_byte()) {
        Ok(opcode) => log::trace!(
            peer = %ctx.peer,
            direction = %Direction::Downstream,
            opcode = %format!("{:#04x}", opcode),
            name = Direction::Downstream.opcode_name(opcode).unwrap_or("unknown"),
            "Frame"
        ),
        Err(e) => log::trace!(peer = %ctx.peer, error = %e, "Undecodable server frame"),
    }
}

/// Hex of the first bytes of a frame for log lines
pub(crate) fn frame_preview(frame: &[u8]) -> String {
    hex::encode(&frame[..frame.len().min(PREVIEW_LEN)])
}
