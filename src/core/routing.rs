//! Character routing table
//!
//! Login sessions record where each character lives; game sessions look the
//! character up to find the real world server. Writes for the same character
//! are serialized by the map's shard lock and the newest login wins.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Real game world endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorldEndpoint {
    pub hostname: String,
    pub port: u16,
}

impl WorldEndpoint {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for WorldEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    endpoint: WorldEndpoint,
    recorded_at: Instant,
}

/// Shared character → world map
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Arc<DashMap<String, RouteEntry>>,
    /// Entries older than this are ignored and purged; `None` keeps them forever
    ttl: Option<Duration>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Record a character's world, returning the endpoint it replaced
    pub fn record(&self, character: &str, endpoint: WorldEndpoint) -> Option<WorldEndpoint> {
        let entry = RouteEntry {
            endpoint,
            recorded_at: Instant::now(),
        };
        self.routes
            .insert(character.to_string(), entry)
            .map(|old| old.endpoint)
    }

    /// World for `character`, unless missing or expired
    ///
    /// Entries are not consumed: a character may reconnect to the game port
    /// without logging in again.
    pub fn lookup(&self, character: &str) -> Option<WorldEndpoint> {
        let entry = self.routes.get(character)?;
        if self.is_expired(&entry) {
            return None;
        }
        Some(entry.endpoint.clone())
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.routes.len();
        self.routes.retain(|_, entry| !self.is_expired(entry));
        before.saturating_sub(self.routes.len())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn is_expired(&self, entry: &RouteEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.recorded_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let table = RoutingTable::new();
        assert!(table.is_empty());
        assert!(table
            .record("Bob", WorldEndpoint::new("10.0.0.1", 7171))
            .is_none());
        assert_eq!(
            table.lookup("Bob"),
            Some(WorldEndpoint::new("10.0.0.1", 7171))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_does_not_consume() {
        let table = RoutingTable::new();
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert!(table.lookup("Bob").is_some());
        assert!(table.lookup("Bob").is_some());
    }

    #[test]
    fn test_missing_character() {
        let table = RoutingTable::new();
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert!(table.lookup("bob").is_none());
        assert!(table.lookup("Alice").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let table = RoutingTable::new();
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        let old = table.record("Bob", WorldEndpoint::new("10.0.0.2", 7172));
        assert_eq!(old, Some(WorldEndpoint::new("10.0.0.1", 7171)));
        assert_eq!(
            table.lookup("Bob"),
            Some(WorldEndpoint::new("10.0.0.2", 7172))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let table = RoutingTable::new();
        let other = table.clone();
        other.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert!(table.lookup("Bob").is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let table = RoutingTable::with_ttl(Some(Duration::ZERO));
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert!(table.lookup("Bob").is_none());
        assert_eq!(table.purge_expired(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_ttl_keeps_fresh_entries() {
        let table = RoutingTable::with_ttl(Some(Duration::from_secs(3600)));
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert!(table.lookup("Bob").is_some());
        assert_eq!(table.purge_expired(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_purge_without_ttl_is_noop() {
        let table = RoutingTable::new();
        table.record("Bob", WorldEndpoint::new("10.0.0.1", 7171));
        assert_eq!(table.purge_expired(), 0);
        assert_eq!(table.ttl(), None);
    }

    #[test]
    fn test_concurrent_writers() {
        let table = RoutingTable::new();
        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for j in 0..100u16 {
                        table.record(
                            &format!("char{}", j % 10),
                            WorldEndpoint::new("10.0.0.1", i * 1000 + j),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(
            WorldEndpoint::new("10.0.0.1", 7171).to_string(),
            "10.0.0.1:7171"
        );
    }
}
