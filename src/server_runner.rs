//! Listener startup and accept loops
//!
//! Binds the login and game listeners, hands each accepted connection to its
//! handler and stops accepting once the shutdown token fires.

use crate::config::ConnConfig;
use crate::core::{Proxy, RoutingTable};
use crate::handler::{process_game_connection, process_login_connection};
use crate::logger::log;

use anyhow::{anyhow, Context, Result};
use socket2::{SockRef, TcpKeepalive};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// TCP keepalive interval.
/// Dead peers are detected in about 45s.
const TCP_KEEPALIVE_SECS: u64 = 15;

/// Pause after a failed accept
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lower bound for the route purge interval
const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Which protocol a listener speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Login,
    Game,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Login => "login",
            ListenerKind::Game => "game",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bind a TCP listener with SO_REUSEADDR for fast restarts
pub fn bind_listener(addr: &str, backlog: i32) -> Result<TcpListener> {
    let socket_addr = addr
        .to_socket_addrs()
        .with_context(|| format!("invalid listen address {}", addr))?
        .next()
        .ok_or_else(|| anyhow!("listen address {} resolved to nothing", addr))?;
    let socket = socket2::Socket::new(
        match socket_addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    // Allow immediate rebind after restart (skip TIME_WAIT)
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(backlog)?;

    Ok(TcpListener::from_std(socket.into())?)
}

/// Apply per-connection socket options
fn tune_stream(stream: &TcpStream, conn: &ConnConfig) {
    if conn.tcp_nodelay {
        let _ = stream.set_nodelay(true);
    }
    // Enable TCP keepalive to detect dead peers
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(TCP_KEEPALIVE_SECS))
        .with_interval(Duration::from_secs(TCP_KEEPALIVE_SECS));
    let _ = SockRef::from(stream).set_tcp_keepalive(&keepalive);
}

/// Run one accepted connection to completion, logging how it ended
async fn handle_connection(
    proxy: Arc<Proxy>,
    kind: ListenerKind,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    tune_stream(&stream, &proxy.config.conn);
    log::connection(kind.as_str(), peer, "new");
    let _guard = scopeguard::guard((), |_| {
        log::connection(kind.as_str(), peer, "closed");
    });

    let result = match kind {
        ListenerKind::Login => process_login_connection(&proxy, stream, peer).await,
        ListenerKind::Game => process_game_connection(&proxy, stream, peer, shutdown).await,
    };
    if let Err(e) = result {
        log::session_error(kind.as_str(), peer, &e);
    }
}

/// Run an accept loop until `shutdown` fires
///
/// Each connection gets its own task, except in debug mode where it is
/// handled inline so only one session per listener runs at a time.
pub async fn run_listener(
    proxy: Arc<Proxy>,
    kind: ListenerKind,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    log::info!(
        listener = %kind,
        address = %local_addr,
        debug = proxy.config.debug,
        "Listener started"
    );

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!(listener = %kind, "Listener stopped");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let session = handle_connection(
                    Arc::clone(&proxy),
                    kind,
                    stream,
                    peer,
                    shutdown.child_token(),
                );
                if proxy.config.debug {
                    tokio::select! {
                        _ = session => {}
                        _ = shutdown.cancelled() => {
                            log::info!(listener = %kind, "Listener stopped");
                            break;
                        }
                    }
                } else {
                    tokio::spawn(session);
                }
            }
            Err(e) => {
                log::error!(listener = %kind, error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }

    Ok(())
}

/// Periodically drop expired routes
fn spawn_route_purger(
    routes: RoutingTable,
    ttl: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl.max(MIN_PURGE_INTERVAL));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = routes.purge_expired();
                    if purged > 0 {
                        log::debug!(purged = purged, remaining = routes.len(), "Expired routes purged");
                    }
                }
            }
        }
    })
}

/// Bind both listeners and serve until `shutdown` fires
///
/// Bind failures are the only errors returned; session errors are logged by
/// the accept loops.
pub async fn run_proxy(proxy: Arc<Proxy>, shutdown: CancellationToken) -> Result<()> {
    let config = &proxy.config;
    let login_addr = config.login_addr();
    let game_addr = config.game_addr();

    let login_listener = bind_listener(&login_addr, config.conn.tcp_backlog)
        .with_context(|| format!("failed to bind login listener on {}", login_addr))?;
    let game_listener = bind_listener(&game_addr, config.conn.tcp_backlog)
        .with_context(|| format!("failed to bind game listener on {}", game_addr))?;

    log::info!(
        login = %login_addr,
        game = %game_addr,
        destination = %config.destination_login_addr(),
        announce = %format!("{}:{}", config.announce_host, config.announce_port),
        rsa = %config.rsa_key,
        plugins = ?proxy.plugins,
        "Proxy started"
    );

    let purger = proxy
        .routes
        .ttl()
        .map(|ttl| spawn_route_purger(proxy.routes.clone(), ttl, shutdown.clone()));

    let result = tokio::try_join!(
        run_listener(
            Arc::clone(&proxy),
            ListenerKind::Login,
            login_listener,
            shutdown.clone()
        ),
        run_listener(
            Arc::clone(&proxy),
            ListenerKind::Game,
            game_listener,
            shutdown.clone()
        ),
    );

    if let Some(purger) = purger {
        purger.abort();
    }
    result.map(|_| ())
}
