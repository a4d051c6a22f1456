//! Connection handling logic
//!
//! Login and game connection state machines. Both are generic over the client
//! stream so tests can drive them over in-memory pipes.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::config::ConnConfig;
use crate::core::relay::frame_preview;
use crate::core::{relay_game_session, Proxy, RelayContext, WorldEndpoint};
use crate::error::{ProxyError, Result, StepContext};
use crate::logger::log;
use crate::protocol::login::parse_reply;
use crate::protocol::{read_frame, Challenge, GameLogin, LoginReply, LoginRequest};

/// Connect to a real server with the configured timeout
async fn connect_upstream(host: &str, port: u16, conn: &ConnConfig) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(conn.connect_timeout, TcpStream::connect((host, port)))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ProxyError::Upstream(format!(
                "connect to {}:{} failed: {}",
                host, port, e
            )))
        }
        Err(_) => {
            return Err(ProxyError::Upstream(format!(
                "connect to {}:{} timed out",
                host, port
            )))
        }
    };
    if conn.tcp_nodelay {
        let _ = stream.set_nodelay(true);
    }
    Ok(stream)
}

/// Process a single login connection
///
/// One round trip: the client's request goes upstream, the reply comes back
/// with world endpoints rewritten to the announce address, and the
/// connection ends.
pub async fn process_login_connection<S>(proxy: &Proxy, mut client: S, peer: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let config = &proxy.config;

    let raw = read_frame(&mut client)
        .await
        .client_step("read login request")?;
    let request = LoginRequest::parse(raw)?;
    log::info!(
        peer = %peer,
        account = ?request.account,
        character = ?request.character,
        has_password = request.has_password(),
        "Login request"
    );

    let mut upstream = connect_upstream(
        &config.destination_login_host,
        config.destination_login_port,
        &config.conn,
    )
    .await?;
    log::debug!(peer = %peer, remote = %config.destination_login_addr(), "Connected to login server");

    upstream
        .write_all(&request.upstream_bytes(config.rsa_key)?)
        .await
        .upstream_step("forward login request")?;
    let reply = read_frame(&mut upstream)
        .await
        .upstream_step("read login reply")?;

    let out = match parse_reply(&reply, &request.key) {
        Ok(LoginReply::CharacterList(list)) => {
            for (character, world) in list.routes() {
                let endpoint = WorldEndpoint::new(world.hostname.clone(), world.port);
                log::debug!(peer = %peer, character = character, world = %world.name, endpoint = %endpoint, "Route recorded");
                if let Some(old) = proxy.routes.record(character, endpoint) {
                    log::debug!(character = character, previous = %old, "Route replaced");
                }
            }
            log::info!(
                peer = %peer,
                worlds = list.worlds().len(),
                characters = list.characters().len(),
                announce = %format!("{}:{}", config.announce_host, config.announce_port),
                "Character list rewritten"
            );
            list.with_announce(&config.announce_host, config.announce_port)
                .to_frame(&request.key)?
        }
        Ok(LoginReply::Other) => {
            log::debug!(peer = %peer, len = reply.len(), "Login reply is not a character list, forwarding");
            reply
        }
        Err(e @ (ProxyError::Framing(_) | ProxyError::UnexpectedEof { .. })) => {
            log::warn!(
                peer = %peer,
                len = reply.len(),
                head = %frame_preview(&reply),
                error = %e,
                "Undecodable login reply passed through"
            );
            reply
        }
        Err(e) => return Err(e),
    };

    client.write_all(&out).await.client_step("send login reply")?;
    client.flush().await.client_step("send login reply")?;
    let _ = client.shutdown().await;
    Ok(())
}

/// Process a single game connection
///
/// Completes the challenge handshake with the real world server on the
/// client's behalf, then relays until either side closes or `shutdown` fires.
pub async fn process_game_connection<S>(
    proxy: &Proxy,
    mut client: S,
    peer: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let challenge = Challenge::generate();
    client
        .write_all(&challenge.to_frame()?)
        .await
        .client_step("send challenge")?;
    client.flush().await.client_step("send challenge")?;

    let raw = read_frame(&mut client)
        .await
        .client_step("read game login")?;
    let login = GameLogin::parse(raw)?;
    if login.echoed != challenge {
        log::warn!(
            peer = %peer,
            character = %login.character,
            sent = ?challenge,
            echoed = ?login.echoed,
            "Client echoed a different challenge"
        );
    }

    let world = proxy
        .routes
        .lookup(&login.character)
        .ok_or_else(|| ProxyError::Routing(login.character.clone()))?;
    log::info!(
        peer = %peer,
        account = %login.account,
        character = %login.character,
        has_password = login.has_password(),
        world = %world,
        "Game login"
    );

    let mut upstream = connect_upstream(&world.hostname, world.port, &proxy.config.conn).await?;
    let server_raw = read_frame(&mut upstream)
        .await
        .upstream_step("read server challenge")?;
    let server_challenge = Challenge::parse(&server_raw)?;
    log::debug!(peer = %peer, challenge = ?server_challenge, "Received server challenge");

    upstream
        .write_all(&login.forward_with(&server_challenge, proxy.config.rsa_key)?)
        .await
        .upstream_step("forward game login")?;

    let ctx = RelayContext {
        key: login.key,
        character: &login.character,
        peer,
        plugins: &proxy.plugins,
    };
    let stats = relay_game_session(client, upstream, ctx, shutdown).await?;
    log::info!(
        peer = %peer,
        character = %login.character,
        client_frames = stats.client_frames,
        server_frames = stats.server_frames,
        suppressed = stats.suppressed,
        malformed = stats.malformed,
        "Game session finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::crypto::rsa::BLOCK_SIZE;
    use crate::crypto::{RsaKey, SessionKey};
    use crate::protocol::login::LOGIN_HEADER_SIZE;
    use crate::protocol::{rewrite_checksum, Message};
    use socket2::SockRef;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn test_proxy(config: ProxyConfig) -> Proxy {
        Proxy::builder().config(config).build().unwrap()
    }

    fn login_request_frame() -> Vec<u8> {
        let mut plain = Message::new();
        plain.add_byte(0);
        for word in SessionKey::new([1, 2, 3, 4]).words() {
            plain.add_u32(word);
        }
        plain.add_string("123456").unwrap();
        plain.add_string("Bob").unwrap();
        plain.add_string("secret").unwrap();
        let mut block = plain.into_bytes();
        block.resize(BLOCK_SIZE, 0);

        let mut raw = vec![0u8; LOGIN_HEADER_SIZE];
        raw.extend_from_slice(&RsaKey::Open.encrypt(&block).unwrap());
        let declared = (raw.len() - 2) as u16;
        raw[..2].copy_from_slice(&declared.to_le_bytes());
        rewrite_checksum(&mut raw).unwrap();
        raw
    }

    #[tokio::test]
    async fn test_game_connection_sends_challenge_first() {
        let proxy = test_proxy(ProxyConfig::default());
        let (client, mut remote) = tokio::io::duplex(4096);
        let task = tokio::spawn(async move {
            process_game_connection(&proxy, client, peer(), CancellationToken::new()).await
        });

        let frame = read_frame(&mut remote).await.unwrap();
        assert!(Challenge::parse(&frame).is_ok());

        // Closing without a login is a clean peer close, not a panic
        drop(remote);
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "io");
        assert!(err.is_peer_closed());
    }

    #[tokio::test]
    async fn test_login_connection_rejects_garbage() {
        let proxy = test_proxy(ProxyConfig::default());
        let (client, mut remote) = tokio::io::duplex(4096);
        let task =
            tokio::spawn(async move { process_login_connection(&proxy, client, peer()).await });

        let mut msg = Message::new();
        msg.add_bytes(&[0u8; 10]);
        remote.write_all(&msg.plain_frame().unwrap()).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "framing");
    }

    #[tokio::test]
    async fn test_connect_upstream_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let conn = ConnConfig {
            connect_timeout: Duration::from_secs(2),
            ..ConnConfig::default()
        };
        let err = connect_upstream("127.0.0.1", port, &conn).await.unwrap_err();
        assert_eq!(err.kind(), "upstream");
    }

    #[tokio::test]
    async fn test_game_connection_names_failed_step() {
        let proxy = test_proxy(ProxyConfig::default());
        let (client, mut remote) = tokio::io::duplex(4096);
        let task = tokio::spawn(async move {
            process_game_connection(&proxy, client, peer(), CancellationToken::new()).await
        });

        read_frame(&mut remote).await.unwrap();
        // Half a frame, then gone
        remote.write_all(&[0x20, 0x00, 0x01]).await.unwrap();
        drop(remote);
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_peer_closed());
        assert!(err.to_string().contains("read game login"));
    }

    #[tokio::test]
    async fn test_login_upstream_write_failure_is_upstream() {
        // Accepts and closes with a reset before reading anything
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            SockRef::from(&stream).set_linger(Some(Duration::ZERO)).unwrap();
            drop(stream);
        });

        let config = ProxyConfig {
            destination_login_host: "127.0.0.1".to_string(),
            destination_login_port: port,
            ..ProxyConfig::default()
        };
        let proxy = test_proxy(config);
        let (client, mut remote) = tokio::io::duplex(4096);
        let task =
            tokio::spawn(async move { process_login_connection(&proxy, client, peer()).await });
        remote.write_all(&login_request_frame()).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "upstream");
        let text = err.to_string();
        assert!(
            text.contains("forward login request") || text.contains("read login reply"),
            "unexpected error: {}",
            text
        );
    }

    #[tokio::test]
    async fn test_upstream_step_on_closed_pipe() {
        let (mut a, b) = tokio::io::duplex(64);
        drop(b);
        let err = a
            .write_all(&[1, 2, 3])
            .await
            .upstream_step("forward game login")
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("forward game login"));

        let (mut a, b) = tokio::io::duplex(64);
        drop(b);
        let err = read_frame(&mut a)
            .await
            .upstream_step("read server challenge")
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
    }
}
