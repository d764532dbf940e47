//! Presence registry.
//!
//! The only authority on who is online. Presence is derived from live
//! connection bindings, never from a separately stored flag, so the
//! snapshot cannot drift from the set of bound connections.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::ws::ConnectionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresenceError {
    /// The connection already carries a different identity
    #[error("connection is already bound to {bound}")]
    AlreadyBound { bound: String },
}

#[derive(Debug, Clone)]
struct Binding {
    username: String,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Bindings {
    by_connection: HashMap<ConnectionId, Binding>,
    /// Reverse mapping used to target a single identity. Always the newest binding.
    by_username: HashMap<String, ConnectionId>,
    /// Live bindings per username
    counts: HashMap<String, usize>,
    next_sequence: u64,
}

/// Connection <-> username bindings behind a single lock.
/// Every operation is O(1) (snapshot aside) and never awaits while holding the lock.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<Bindings>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Bindings> {
        // No operation can leave the maps half-updated, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind `username` to `connection` and point the reverse mapping at it.
    ///
    /// Returns the connection that previously held the reverse mapping for
    /// this username, if any. That connection is not closed or notified; it
    /// simply stops being the target for private delivery.
    /// Binding a connection to the name it already carries is a no-op.
    pub fn bind(
        &self,
        connection: ConnectionId,
        username: &str,
    ) -> Result<Option<ConnectionId>, PresenceError> {
        let mut bindings = self.lock();

        if let Some(existing) = bindings.by_connection.get(&connection) {
            if existing.username == username {
                return Ok(None);
            }
            return Err(PresenceError::AlreadyBound {
                bound: existing.username.clone(),
            });
        }

        let sequence = bindings.next_sequence;
        bindings.next_sequence += 1;
        bindings.by_connection.insert(
            connection,
            Binding {
                username: username.to_string(),
                sequence,
            },
        );
        *bindings.counts.entry(username.to_string()).or_insert(0) += 1;

        let superseded = bindings
            .by_username
            .insert(username.to_string(), connection)
            .filter(|previous| *previous != connection);
        Ok(superseded)
    }

    /// Remove the binding held by `connection` and return the username it carried.
    ///
    /// The reverse mapping is only cleared when it still points at this
    /// connection, so a superseded connection closing late cannot erase the
    /// binding of the connection that replaced it.
    pub fn unbind(&self, connection: ConnectionId) -> Option<String> {
        let mut bindings = self.lock();
        let binding = bindings.by_connection.remove(&connection)?;

        if bindings.by_username.get(&binding.username) == Some(&connection) {
            bindings.by_username.remove(&binding.username);
        }

        let remaining = match bindings.counts.get_mut(&binding.username) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            bindings.counts.remove(&binding.username);
        }

        Some(binding.username)
    }

    /// True while at least one live connection is bound to `username`.
    pub fn is_online(&self, username: &str) -> bool {
        self.lock().counts.contains_key(username)
    }

    /// The connection private messages and typing signals for `username` go to.
    pub fn resolve(&self, username: &str) -> Option<ConnectionId> {
        self.lock().by_username.get(username).copied()
    }

    pub fn username_of(&self, connection: ConnectionId) -> Option<String> {
        self.lock()
            .by_connection
            .get(&connection)
            .map(|binding| binding.username.clone())
    }

    /// Distinct online usernames, ordered by their earliest live binding.
    pub fn snapshot(&self) -> Vec<String> {
        let bindings = self.lock();
        let mut earliest: HashMap<&str, u64> = HashMap::new();
        for binding in bindings.by_connection.values() {
            earliest
                .entry(binding.username.as_str())
                .and_modify(|seq| *seq = (*seq).min(binding.sequence))
                .or_insert(binding.sequence);
        }

        let mut ordered: Vec<(&str, u64)> = earliest.into_iter().collect();
        ordered.sort_by_key(|(_, seq)| *seq);
        ordered.into_iter().map(|(name, _)| name.to_string()).collect()
    }

    /// Every connection currently bound to some identity.
    pub fn bound_connections(&self) -> Vec<ConnectionId> {
        self.lock().by_connection.keys().copied().collect()
    }
}
