//! Shared fixtures for unit tests.

use async_trait::async_trait;
use axum::extract::ws::Message as WsMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::db::init_memory_db;
use crate::db::models::{now_timestamp, Group, Message, NewGroup, NewMessage, User};
use crate::gateway::{Gateway, GatewayError, Order, Result, ScopeFilter, SqliteGateway};
use crate::state::{AppState, RuntimeSettings};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionId;

/// App state over a fresh in-memory database.
pub fn memory_state() -> AppState {
    let db = init_memory_db().expect("Failed to init in-memory DB");
    let gateway = Arc::new(SqliteGateway::new(db, Duration::from_secs(5)));
    AppState::new(gateway, RuntimeSettings::default())
}

/// App state whose gateway knows "alice" and "bob" but fails every other call.
pub fn failing_state() -> AppState {
    let gateway = Arc::new(FailingGateway {
        known_users: vec!["alice".to_string(), "bob".to_string()],
    });
    AppState::new(gateway, RuntimeSettings::default())
}

pub async fn seed_users(state: &AppState, names: &[&str]) {
    for name in names {
        state
            .gateway
            .create_user(name, "not-a-real-hash")
            .await
            .expect("Failed to seed user");
    }
}

/// Register an anonymous connection and return the receiving half of its channel.
pub fn connect(state: &AppState) -> (ConnectionId, mpsc::UnboundedReceiver<WsMessage>) {
    let connection = ConnectionId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    state.connections.insert(connection, tx);
    (connection, rx)
}

/// Register a connection and bind it straight in the presence registry,
/// skipping the login handshake.
pub fn login_raw(
    state: &AppState,
    username: &str,
) -> (ConnectionId, mpsc::UnboundedReceiver<WsMessage>) {
    let (connection, rx) = connect(state);
    state
        .presence
        .bind(connection, username)
        .expect("Fresh connection cannot be bound");
    (connection, rx)
}

/// Everything queued for a connection so far, decoded.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let WsMessage::Text(text) = msg {
            events.push(serde_json::from_str(text.as_str()).expect("Invalid server event"));
        }
    }
    events
}

/// Gateway whose backend is down. User lookups still answer for `known_users`
/// so sessions can authenticate and exercise the degraded paths.
pub struct FailingGateway {
    pub known_users: Vec<String>,
}

fn down<T>() -> Result<T> {
    Err(GatewayError::Internal("backend unavailable".to_string()))
}

#[async_trait]
impl Gateway for FailingGateway {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .known_users
            .iter()
            .find(|known| *known == username)
            .map(|known| User {
                username: known.clone(),
                is_online: false,
                last_active: None,
                created_at: now_timestamp(),
            }))
    }

    async fn set_online(&self, _username: &str, _online: bool) -> Result<()> {
        down()
    }

    async fn list_online(&self) -> Result<Vec<String>> {
        down()
    }

    async fn find_group(&self, _group_id: &str) -> Result<Option<Group>> {
        down()
    }

    async fn is_member(&self, _group_id: &str, _username: &str) -> Result<bool> {
        down()
    }

    async fn groups_for_user(&self, _username: &str) -> Result<Vec<Group>> {
        down()
    }

    async fn append_message(&self, _message: NewMessage) -> Result<Message> {
        down()
    }

    async fn query_messages(
        &self,
        _filter: ScopeFilter,
        _limit: usize,
        _order: Order,
    ) -> Result<Vec<Message>> {
        down()
    }

    async fn mark_read(&self, _sender: &str, _recipient: &str) -> Result<usize> {
        down()
    }

    async fn create_user(&self, _username: &str, _password_hash: &str) -> Result<User> {
        down()
    }

    async fn password_hash(&self, _username: &str) -> Result<Option<String>> {
        down()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        down()
    }

    async fn create_group(&self, _new_group: NewGroup) -> Result<Group> {
        down()
    }

    async fn add_member(&self, _group_id: &str, _username: &str) -> Result<Group> {
        down()
    }

    async fn remove_member(&self, _group_id: &str, _username: &str) -> Result<Group> {
        down()
    }
}
