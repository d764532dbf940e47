//! Connection lifecycle: Anonymous -> Authenticated -> Disconnected.
//!
//! A session owns nothing shared; it drives the presence registry, the rooms,
//! the router and the typing relay on behalf of one connection. Logout is
//! connection teardown, there is no other way back out of Authenticated.

use crate::chat::broadcast::{broadcast_except, broadcast_to_all, send_to_connection};
use crate::chat::typing::TypingTarget;
use crate::chat::Origin;
use crate::db::models::Message;
use crate::state::AppState;
use crate::ws::protocol::{ChatLine, ClientEvent, GroupView, MessageView, ServerEvent};
use crate::ws::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Only a login is accepted
    Anonymous,
    Authenticated { username: String },
    /// Terminal
    Disconnected,
}

pub struct Session {
    connection: ConnectionId,
    state: AppState,
    phase: SessionState,
}

fn views(messages: Vec<Message>) -> Vec<MessageView> {
    messages.into_iter().map(MessageView::from).collect()
}

impl Session {
    pub fn new(connection: ConnectionId, state: AppState) -> Self {
        Self {
            connection,
            state,
            phase: SessionState::Anonymous,
        }
    }

    pub fn phase(&self) -> &SessionState {
        &self.phase
    }

    pub fn username(&self) -> Option<&str> {
        match &self.phase {
            SessionState::Authenticated { username } => Some(username.as_str()),
            _ => None,
        }
    }

    /// Handle one inbound event. Failures are logged, never reported to the client.
    pub async fn handle(&mut self, event: ClientEvent) {
        let username = match &self.phase {
            SessionState::Disconnected => return,
            SessionState::Anonymous => None,
            SessionState::Authenticated { username } => Some(username.clone()),
        };
        let Some(username) = username else {
            match event {
                ClientEvent::UserLogin { username } => self.login(&username).await,
                other => {
                    tracing::debug!(
                        connection_id = %self.connection,
                        event = other.name(),
                        "Ignoring event from anonymous connection"
                    );
                }
            }
            return;
        };
        let origin = Origin::new(self.connection, &username);

        match event {
            ClientEvent::UserLogin { username: requested } => {
                if requested.trim() != username {
                    tracing::debug!(
                        connection_id = %self.connection,
                        username = %username,
                        requested = %requested,
                        "Connection is already bound, ignoring login"
                    );
                }
            }
            ClientEvent::SendMessage { text } => {
                self.state.router.send_global(origin, &text).await;
            }
            ClientEvent::SendPrivateMessage { recipient, text } => {
                self.state.router.send_private(origin, &recipient, &text).await;
            }
            ClientEvent::SendGroupMessage { group_id, text } => {
                self.state.router.send_group(origin, &group_id, &text).await;
            }
            ClientEvent::Typing {
                recipient,
                is_typing,
            } => {
                self.state
                    .typing
                    .set_typing(origin, &TypingTarget::Peer(recipient), is_typing);
            }
            ClientEvent::TypingInGroup {
                group_id,
                is_typing,
            } => {
                self.state
                    .typing
                    .set_typing(origin, &TypingTarget::Group(group_id), is_typing);
            }
            ClientEvent::GetGlobalMessages => {
                if let Some(messages) = self.state.router.replay_global().await {
                    self.send(&ServerEvent::GlobalMessageHistory(views(messages)));
                }
            }
            ClientEvent::GetPrivateMessages { username: other } => {
                let other = other.trim();
                if let Some(messages) = self.state.router.replay_private(&username, other).await {
                    self.send(&ServerEvent::PrivateMessageHistory {
                        username: other.to_string(),
                        messages: views(messages),
                    });
                }
            }
            ClientEvent::GetGroupMessages { group_id } => {
                let group_id = group_id.trim();
                if let Some(messages) = self.state.router.replay_group(&username, group_id).await {
                    self.send(&ServerEvent::GroupMessageHistory {
                        group_id: group_id.to_string(),
                        messages: views(messages),
                    });
                }
            }
        }
    }

    fn send(&self, event: &ServerEvent) -> bool {
        send_to_connection(&self.state.connections, self.connection, event)
    }

    async fn login(&mut self, requested: &str) {
        let username = requested.trim();
        if username.is_empty() {
            tracing::debug!(connection_id = %self.connection, "Ignoring login without username");
            return;
        }

        match self.state.gateway.find_user(username).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(
                    connection_id = %self.connection,
                    username = %username,
                    "Ignoring login for unknown user"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection,
                    username = %username,
                    error = %e,
                    "User lookup failed during login"
                );
                return;
            }
        }

        // Bind first so concurrent private sends resolve to this connection
        match self.state.presence.bind(self.connection, username) {
            Ok(Some(superseded)) => {
                tracing::info!(
                    username = %username,
                    connection_id = %self.connection,
                    superseded = %superseded,
                    "User logged in again, earlier connection no longer receives private traffic"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(connection_id = %self.connection, error = %e, "Bind refused");
                return;
            }
        }
        self.phase = SessionState::Authenticated {
            username: username.to_string(),
        };

        // Persisted online flag and memberships
        if let Err(e) = self.state.gateway.set_online(username, true).await {
            tracing::warn!(username = %username, error = %e, "Failed to mark user online");
        }
        let groups = match self.state.gateway.groups_for_user(username).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "Failed to load group memberships");
                Vec::new()
            }
        };

        // Rooms
        for group in &groups {
            self.state.rooms.join(self.connection, &group.id);
        }

        // Notices, presence, group list
        self.send(&ServerEvent::Message(ChatLine::system(format!(
            "Welcome to the chat, {}!",
            username
        ))));
        broadcast_except(
            &self.state.connections,
            self.connection,
            &ServerEvent::Message(ChatLine::system(format!("{} has joined the chat", username))),
        );
        broadcast_to_all(
            &self.state.connections,
            &ServerEvent::UpdateOnlineUsers(self.state.presence.snapshot()),
        );
        self.send(&ServerEvent::GroupList(
            groups.into_iter().map(GroupView::from).collect(),
        ));

        tracing::info!(
            username = %username,
            connection_id = %self.connection,
            "User logged in"
        );
    }

    /// Tear the connection down. Safe to call more than once.
    ///
    /// The in-memory unbind always happens. The persisted offline flag and the
    /// departure notice only go out once no other connection is bound to the
    /// same identity, and a failed write is only logged.
    pub async fn teardown(&mut self) {
        let phase = std::mem::replace(&mut self.phase, SessionState::Disconnected);

        self.state.connections.remove(&self.connection);
        self.state.rooms.leave_all(self.connection);

        let SessionState::Authenticated { username } = phase else {
            return;
        };

        self.state.presence.unbind(self.connection);
        // A newer connection still holds the identity: no offline flag, no notice
        if !self.state.presence.is_online(&username) {
            if let Err(e) = self.state.gateway.set_online(&username, false).await {
                tracing::warn!(username = %username, error = %e, "Failed to mark user offline");
            }
            broadcast_to_all(
                &self.state.connections,
                &ServerEvent::Message(ChatLine::system(format!("{} has left the chat", username))),
            );
        }

        broadcast_to_all(
            &self.state.connections,
            &ServerEvent::UpdateOnlineUsers(self.state.presence.snapshot()),
        );

        tracing::info!(
            username = %username,
            connection_id = %self.connection,
            "User logged out"
        );
    }
}
