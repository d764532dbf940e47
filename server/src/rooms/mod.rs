//! Room registry: which connections receive a group's live traffic.
//!
//! Subscriptions are computed from group membership at login and are not
//! re-evaluated afterwards. Sending still checks persisted membership on
//! every message, so a removed member keeps receiving until they reconnect
//! but can no longer post.

use dashmap::{DashMap, DashSet};

use crate::ws::ConnectionId;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    room_connections: DashMap<String, DashSet<ConnectionId>>,
    connection_rooms: DashMap<ConnectionId, DashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, connection: ConnectionId, group_id: &str) {
        self.room_connections
            .entry(group_id.to_string())
            .or_default()
            .insert(connection);
        self.connection_rooms
            .entry(connection)
            .or_default()
            .insert(group_id.to_string());
    }

    /// Drop every subscription held by `connection`. Returns the rooms it left.
    pub fn leave_all(&self, connection: ConnectionId) -> Vec<String> {
        let Some((_, rooms)) = self.connection_rooms.remove(&connection) else {
            return Vec::new();
        };

        let rooms: Vec<String> = rooms.into_iter().collect();
        for room in &rooms {
            if let Some(members) = self.room_connections.get(room) {
                members.remove(&connection);
            }
            self.room_connections
                .remove_if(room, |_, members| members.is_empty());
        }
        rooms
    }

    /// Connections currently subscribed to `group_id`.
    pub fn connections(&self, group_id: &str) -> Vec<ConnectionId> {
        self.room_connections
            .get(group_id)
            .map(|members| members.iter().map(|c| *c).collect())
            .unwrap_or_default()
    }

    pub fn is_joined(&self, connection: ConnectionId, group_id: &str) -> bool {
        self.room_connections
            .get(group_id)
            .map(|members| members.contains(&connection))
            .unwrap_or(false)
    }
}
