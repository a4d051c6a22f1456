// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tibia_proxy::config::{self, ProxyConfig};
use tibia_proxy::core::Proxy;
use tibia_proxy::logger::{self, log};
use tibia_proxy::{plugins, server_runner};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = config::CliArgs::parse_args();
    cli.validate()?;

    // Initialize logger
    logger::init_logger(&cli.log_mode);

    let proxy_config = ProxyConfig::from_cli(&cli);
    log::info!(
        version = env!("CARGO_PKG_VERSION"),
        rsa = %proxy_config.rsa_key,
        debug = proxy_config.debug,
        route_ttl = ?proxy_config.route_ttl,
        "Starting Tibia proxy"
    );

    let registry = plugins::build_registry(&proxy_config.plugins)?;

    // Build proxy using the builder pattern
    let proxy = Arc::new(
        Proxy::builder()
            .config(proxy_config)
            .plugins(registry)
            .build()?,
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();
    let cancel_token_clone = cancel_token.clone();

    // Setup shutdown handler
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT");
            let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");

            tokio::select! {
                _ = sigint.recv() => {
                    log::info!("SIGINT received, shutting down...");
                }
                _ = sigterm.recv() => {
                    log::info!("SIGTERM received, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutdown signal received...");
        }

        cancel_token_clone.cancel();
    });

    // Run listeners
    server_runner::run_proxy(proxy, cancel_token).await?;
    log::info!("Proxy stopped");
    Ok(())
}
