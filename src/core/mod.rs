//! Core proxy module
//!
//! This module contains the session plumbing shared by both listeners:
//! - Character routing table
//! - Game relay with chat inspection
//! - Chat plugin hooks
//! - The `Proxy` that ties them to a configuration

pub mod hooks;
pub mod relay;
pub mod routing;
mod server;

pub use hooks::{ChatPlugin, ClientHandle, PluginRegistry};
pub use relay::{relay_game_session, FrameAction, RelayContext, RelayStats};
pub use routing::{RoutingTable, WorldEndpoint};
pub use server::{Proxy, ProxyBuilder};
