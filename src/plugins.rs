//! Built-in chat plugins
//!
//! Plugins are enabled by name from the command line and consulted in the
//! order given.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{ChatPlugin, ClientHandle, PluginRegistry};
use crate::error::{ProxyError, Result};
use crate::logger::log;
use crate::protocol::Position;

/// Answers "hello world" with a canned reply
#[derive(Debug, Default)]
pub struct Greeting;

impl Greeting {
    pub const NAME: &'static str = "greeting";
    const TRIGGER: &'static str = "hello world";
    const REPLY: &'static str = "yeah, hi!";
    const SPEAKER: &'static str = "1";
}

#[async_trait]
impl ChatPlugin for Greeting {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn on_client_say(&self, conn: &mut ClientHandle<'_>, text: &str) -> bool {
        if text != Self::TRIGGER {
            return false;
        }
        if let Err(e) = conn
            .send_chat(Self::SPEAKER, 1, Position::new(96, 123, 7), Self::REPLY)
            .await
        {
            log::warn!(peer = %conn.peer(), error = %e, "Greeting reply failed");
        }
        true
    }
}

/// Names accepted by `build_registry`
pub const AVAILABLE: &[&str] = &[Greeting::NAME];

/// Build a registry from plugin names, preserving order
pub fn build_registry<I, S>(names: I) -> Result<PluginRegistry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut registry = PluginRegistry::new();
    for name in names {
        let plugin: Arc<dyn ChatPlugin> = match name.as_ref() {
            Greeting::NAME => Arc::new(Greeting),
            other => {
                return Err(ProxyError::Config(format!(
                    "unknown plugin '{}' (available: {})",
                    other,
                    AVAILABLE.join(", ")
                )))
            }
        };
        registry.register(plugin);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKey;
    use crate::protocol::decrypt_frame;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_greeting_replies_to_hello_world() {
        let key = SessionKey::new([9, 8, 7, 6]);
        let mut out = Vec::new();
        let handled = {
            let mut conn = ClientHandle::new(&mut out, key, "Bob", peer());
            Greeting.on_client_say(&mut conn, "hello world").await
        };
        assert!(handled);

        let mut msg = decrypt_frame(&out, &key).unwrap();
        assert_eq!(msg.get_byte().unwrap(), 0xAA);
        assert_eq!(msg.get_u32().unwrap(), 0);
        assert_eq!(msg.get_string().unwrap(), "1");
        assert_eq!(msg.get_u16().unwrap(), 1);
        assert_eq!(msg.get_byte().unwrap(), 1);
        assert_eq!(msg.get_u16().unwrap(), 96);
        assert_eq!(msg.get_u16().unwrap(), 123);
        assert_eq!(msg.get_byte().unwrap(), 7);
        assert_eq!(msg.get_string().unwrap(), "yeah, hi!");
        assert_eq!(msg.remaining(), 0);
    }

    #[tokio::test]
    async fn test_greeting_ignores_other_text() {
        let mut out = Vec::new();
        let mut conn = ClientHandle::new(&mut out, SessionKey::default(), "Bob", peer());
        assert!(!Greeting.on_client_say(&mut conn, "Hello World").await);
        assert!(!Greeting.on_client_say(&mut conn, "hello world!").await);
        drop(conn);
        assert!(out.is_empty());
    }

    #[test]
    fn test_build_registry() {
        let registry = build_registry(["greeting"]).unwrap();
        assert_eq!(registry.names(), vec!["greeting"]);

        let configured = vec!["greeting".to_string(), "greeting".to_string()];
        assert_eq!(build_registry(&configured).unwrap().len(), 2);

        let empty: [&str; 0] = [];
        assert!(build_registry(empty).unwrap().is_empty());
    }

    #[test]
    fn test_build_registry_unknown_name() {
        let err = build_registry(["greeting", "eval"]).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("eval"));
    }
}
