//! Process-wide connection registry, keyed by peer address.
//!
//! One [`ConnectionState`] per accepted socket registers itself here on
//! [`ConnectionState::listen`] and removes itself on disconnect. The table
//! holds no protocol state of its own — entries never cross-reference each
//! other — it exists only so a host can look a connection back up by peer
//! address (e.g. to push an unsolicited signal to an already-connected
//! device).

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::connection::ConnectionState;
use crate::env::Environment;
use crate::transport::Transport;

/// Shared table of live connections, keyed by `"{peer_id}"` (typically
/// `"{ip}_{port}"`, per the transport's own [`Transport::peer_id`]).
///
/// Cloning shares the same underlying table; this is how a `listen`er task
/// and the host code that later looks connections up both see the same
/// registry.
pub struct ConnectionRegistry<E: Environment, T: Transport> {
    entries: Arc<Mutex<HashMap<String, ConnectionState<E, T>>>>,
}

impl<E: Environment, T: Transport> Clone for ConnectionRegistry<E, T> {
    fn clone(&self) -> Self {
        Self { entries: self.entries.clone() }
    }
}

impl<E: Environment, T: Transport> Default for ConnectionRegistry<E, T> {
    fn default() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<E: Environment, T: Transport> ConnectionRegistry<E, T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn` under `key`, replacing any prior entry for the same
    /// key (a peer reconnecting from the same address supersedes the stale
    /// entry rather than being rejected).
    pub fn register(&self, key: String, conn: ConnectionState<E, T>) {
        self.entries.lock().expect("registry mutex poisoned").insert(key, conn);
    }

    /// Removes and returns the connection registered under `key`, if any.
    /// Safe to call more than once for the same key; the second call
    /// returns `None`.
    pub fn unregister(&self, key: &str) -> Option<ConnectionState<E, T>> {
        self.entries.lock().expect("registry mutex poisoned").remove(key)
    }

    /// Looks up the connection registered under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ConnectionState<E, T>> {
        self.entries.lock().expect("registry mutex poisoned").get(key).cloned()
    }

    /// Number of currently registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry mutex poisoned").len()
    }

    /// Whether no connections are currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("registry mutex poisoned").is_empty()
    }
}
