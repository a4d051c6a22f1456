//! Core proxy state
//!
//! The Proxy struct holds everything a login or game session needs and is
//! shared between listeners behind an `Arc`.

use super::hooks::PluginRegistry;
use super::routing::RoutingTable;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

/// Core proxy
#[derive(Debug)]
pub struct Proxy {
    /// Resolved configuration
    pub config: ProxyConfig,
    /// Character routes written by login sessions, read by game sessions
    pub routes: RoutingTable,
    /// Chat plugins consulted by game relays
    pub plugins: PluginRegistry,
}

impl Proxy {
    /// Create a new proxy builder
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::new()
    }
}

/// Builder for constructing a Proxy
#[derive(Default)]
pub struct ProxyBuilder {
    config: Option<ProxyConfig>,
    routes: Option<RoutingTable>,
    plugins: Option<PluginRegistry>,
}

impl ProxyBuilder {
    /// Create a new proxy builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing routing table
    pub fn routes(mut self, routes: RoutingTable) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Set chat plugins
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Build the proxy
    ///
    /// Without an explicit routing table a fresh one honoring the configured
    /// TTL is created.
    pub fn build(self) -> Result<Proxy> {
        let config = self
            .config
            .ok_or_else(|| ProxyError::Config("proxy config is required".to_string()))?;
        let routes = self
            .routes
            .unwrap_or_else(|| RoutingTable::with_ttl(config.route_ttl));
        Ok(Proxy {
            config,
            routes,
            plugins: self.plugins.unwrap_or_default(),
        })
    }
}
