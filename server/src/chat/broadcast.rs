//! Fan-out helpers.
//!
//! Each event is encoded once and pushed into the per-connection channels.
//! Delivery to one connection never depends on another: a closed channel is
//! logged and skipped. Every helper returns how many connections accepted
//! the frame.

use axum::extract::ws::Message;

use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionRegistry, ConnectionSender};

fn encode(event: &ServerEvent) -> Option<Message> {
    match event.to_message() {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode server event");
            None
        }
    }
}

fn deliver(connection: ConnectionId, sender: &ConnectionSender, msg: Message) -> bool {
    if sender.send(msg).is_err() {
        tracing::warn!(connection_id = %connection, "Dropping frame for closed connection");
        return false;
    }
    true
}

/// Send an event to every live connection.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) -> usize {
    let Some(msg) = encode(event) else {
        return 0;
    };

    registry
        .iter()
        .filter(|entry| deliver(*entry.key(), entry.value(), msg.clone()))
        .count()
}

/// Send an event to every live connection except `skip`.
pub fn broadcast_except(
    registry: &ConnectionRegistry,
    skip: ConnectionId,
    event: &ServerEvent,
) -> usize {
    let Some(msg) = encode(event) else {
        return 0;
    };

    registry
        .iter()
        .filter(|entry| *entry.key() != skip)
        .filter(|entry| deliver(*entry.key(), entry.value(), msg.clone()))
        .count()
}

/// Send an event to a single connection.
pub fn send_to_connection(
    registry: &ConnectionRegistry,
    connection: ConnectionId,
    event: &ServerEvent,
) -> bool {
    let Some(msg) = encode(event) else {
        return false;
    };

    match registry.get(&connection) {
        Some(sender) => deliver(connection, sender.value(), msg),
        None => {
            tracing::debug!(connection_id = %connection, "Target connection is gone");
            false
        }
    }
}

/// Send an event to each of `connections` that is still live.
pub fn send_to_many(
    registry: &ConnectionRegistry,
    connections: &[ConnectionId],
    event: &ServerEvent,
) -> usize {
    let Some(msg) = encode(event) else {
        return 0;
    };

    connections
        .iter()
        .filter(|connection| match registry.get(*connection) {
            Some(sender) => deliver(**connection, sender.value(), msg.clone()),
            None => false,
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::new_connection_registry;
    use crate::ws::protocol::ChatLine;
    use tokio::sync::mpsc;

    #[test]
    fn closed_connection_does_not_block_others() {
        let registry = new_connection_registry();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);

        let live = ConnectionId::new();
        let dead = ConnectionId::new();
        registry.insert(live, live_tx);
        registry.insert(dead, dead_tx);

        let event = ServerEvent::Message(ChatLine::system("hello"));
        assert_eq!(broadcast_to_all(&registry, &event), 1);
        assert!(live_rx.try_recv().is_ok());

        assert_eq!(send_to_many(&registry, &[dead, live, ConnectionId::new()], &event), 1);
        assert!(!send_to_connection(&registry, dead, &event));
    }

    #[test]
    fn broadcast_except_skips_one() {
        let registry = new_connection_registry();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.insert(a, a_tx);
        registry.insert(b, b_tx);

        let event = ServerEvent::UpdateOnlineUsers(vec!["alice".to_string()]);
        assert_eq!(broadcast_except(&registry, a, &event), 1);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }
}
