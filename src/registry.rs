//! posebridge-osc/src/registry.rs
//!
//! The keyed collection of live receiver sessions. Discovery writes into it
//! from its own task while the per-frame dispatch path reads; callers must
//! iterate over `snapshot()`, never the live map.

use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info};

/// Reserved key for the user-entered override destination. Only the manual
/// override path may create or remove this entry; discovery never touches it.
pub const MANUAL_SESSION_KEY: &str = "MANUAL";

/// One send target: a destination (address, port) under a registry key.
/// Two sessions compare equal when they point at the same destination,
/// regardless of key.
#[derive(Debug, Clone)]
pub struct ReceiverSession {
    pub key: String,
    pub address: IpAddr,
    pub port: u16,
}

impl ReceiverSession {
    pub fn new(key: impl Into<String>, address: IpAddr, port: u16) -> Self {
        Self { key: key.into(), address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl PartialEq for ReceiverSession {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for ReceiverSession {}

/// Concurrent map of session key → [`ReceiverSession`]. One writer
/// (discovery callbacks) and one reader (dispatch) may run at the same time;
/// `snapshot()` hands the reader a stable copy to iterate.
pub struct ReceiverRegistry {
    sessions: DashMap<String, ReceiverSession>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Inserts or replaces the session under its key. A re-announcement with
    /// an unchanged destination is a no-op; returns whether the map changed.
    pub fn upsert(&self, session: ReceiverSession) -> bool {
        // The read guard must drop before the insert below touches the shard.
        let unchanged = self
            .sessions
            .get(&session.key)
            .map(|existing| *existing == session)
            .unwrap_or(false);
        if unchanged {
            debug!(
                "receiver '{}' re-announced with unchanged destination {}, skipping",
                session.key,
                session.socket_addr()
            );
            return false;
        }
        info!(
            "receiver session '{}' => {}",
            session.key,
            session.socket_addr()
        );
        self.sessions.insert(session.key.clone(), session);
        true
    }

    pub fn remove(&self, key: &str) -> Option<ReceiverSession> {
        let removed = self.sessions.remove(key).map(|(_, s)| s);
        if let Some(ref s) = removed {
            info!("receiver session '{}' removed ({})", key, s.socket_addr());
        }
        removed
    }

    /// Drops every discovered session, keeping only the MANUAL entry if
    /// present. The manual override takes precedence over anything discovery
    /// accepted earlier.
    pub fn remove_discovered(&self) {
        let before = self.sessions.len();
        self.sessions.retain(|key, _| key == MANUAL_SESSION_KEY);
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            info!("dropped {dropped} discovered receiver session(s)");
        }
    }

    pub fn get(&self, key: &str) -> Option<ReceiverSession> {
        self.sessions.get(key).map(|s| s.clone())
    }

    /// Stable copy of all sessions for iteration outside the map's locks.
    pub fn snapshot(&self) -> Vec<ReceiverSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for ReceiverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
