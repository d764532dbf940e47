//! Typing indicator relay. Nothing here is persisted.
//!
//! Stop-typing timeouts belong to the client: the coordinator only forwards
//! whatever transitions it is given.

use std::sync::Arc;

use super::broadcast::{send_to_connection, send_to_many};
use super::Origin;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingTarget {
    /// A single identity, reached through its current connection
    Peer(String),
    /// Everyone joined to the group's room
    Group(String),
}

pub struct TypingCoordinator {
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    connections: ConnectionRegistry,
}

impl TypingCoordinator {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        connections: ConnectionRegistry,
    ) -> Self {
        Self {
            presence,
            rooms,
            connections,
        }
    }

    /// Relay a typing transition. Returns how many connections received it.
    /// Connections bound to the sender's own identity never get the echo.
    pub fn set_typing(&self, origin: Origin<'_>, target: &TypingTarget, is_typing: bool) -> usize {
        match target {
            TypingTarget::Peer(peer) => {
                if peer == origin.username {
                    return 0;
                }
                let Some(connection) = self.presence.resolve(peer) else {
                    return 0;
                };

                let event = ServerEvent::UserTyping {
                    user: origin.username.to_string(),
                    is_typing,
                };
                usize::from(send_to_connection(&self.connections, connection, &event))
            }
            TypingTarget::Group(group_id) => {
                let targets: Vec<_> = self
                    .rooms
                    .connections(group_id)
                    .into_iter()
                    .filter(|connection| {
                        *connection != origin.connection
                            && self.presence.username_of(*connection).as_deref()
                                != Some(origin.username)
                    })
                    .collect();

                let event = ServerEvent::UserTypingInGroup {
                    user: origin.username.to_string(),
                    group_id: group_id.clone(),
                    is_typing,
                };
                send_to_many(&self.connections, &targets, &event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{drain, login_raw, memory_state};

    #[tokio::test]
    async fn private_typing_reaches_peer_only() {
        let state = memory_state();
        let (alice, mut alice_rx) = login_raw(&state, "alice");
        let (_bob, mut bob_rx) = login_raw(&state, "bob");
        let origin = Origin::new(alice, "alice");
        let target = TypingTarget::Peer("bob".to_string());

        assert_eq!(state.typing.set_typing(origin, &target, true), 1);
        assert_eq!(state.typing.set_typing(origin, &target, false), 1);

        assert_eq!(
            drain(&mut bob_rx),
            vec![
                ServerEvent::UserTyping {
                    user: "alice".to_string(),
                    is_typing: true
                },
                ServerEvent::UserTyping {
                    user: "alice".to_string(),
                    is_typing: false
                },
            ]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn typing_to_offline_peer_or_self_goes_nowhere() {
        let state = memory_state();
        let (alice, mut alice_rx) = login_raw(&state, "alice");
        let origin = Origin::new(alice, "alice");

        assert_eq!(
            state
                .typing
                .set_typing(origin, &TypingTarget::Peer("carol".into()), true),
            0
        );
        assert_eq!(
            state
                .typing
                .set_typing(origin, &TypingTarget::Peer("alice".into()), true),
            0
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn group_typing_skips_every_sender_connection() {
        let state = memory_state();
        let (alice, mut alice_rx) = login_raw(&state, "alice");
        let (alice_tab, mut alice_tab_rx) = login_raw(&state, "alice");
        let (bob, mut bob_rx) = login_raw(&state, "bob");
        let (_dave, mut dave_rx) = login_raw(&state, "dave");
        for connection in [alice, alice_tab, bob] {
            state.rooms.join(connection, "g1");
        }

        let target = TypingTarget::Group("g1".to_string());
        assert_eq!(
            state
                .typing
                .set_typing(Origin::new(alice, "alice"), &target, true),
            1
        );

        assert!(matches!(
            &drain(&mut bob_rx)[..],
            [ServerEvent::UserTypingInGroup { user, group_id, is_typing: true }]
                if user == "alice" && group_id == "g1"
        ));
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut alice_tab_rx).is_empty());
        assert!(drain(&mut dave_rx).is_empty());
    }
}
