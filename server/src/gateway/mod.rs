//! Identity & persistence gateway.
//!
//! The real-time core only talks to storage through the [Gateway] trait.
//! Every call may suspend, may be slow, and may fail; callers log failures
//! and degrade the single operation they were serving.

mod sqlite;

pub use sqlite::SqliteGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{Group, Message, NewGroup, NewMessage, User};

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A resource doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// The backend did not answer within the configured bound
    #[error("gateway call timed out")]
    Timeout,
    /// Something else went wrong with the backend
    #[error("{0}")]
    Internal(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

/// Which slice of the message log a query reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    Global,
    /// Both directions of a one-to-one thread
    Private { a: String, b: String },
    Group { group_id: String },
}

/// Order of the returned window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    OldestFirst,
    NewestFirst,
}

/// Storage boundary for identities, groups and the message log
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>>;
    /// Sets the persisted online flag and stamps `last_active`
    async fn set_online(&self, username: &str, online: bool) -> Result<()>;
    async fn list_online(&self) -> Result<Vec<String>>;

    async fn find_group(&self, group_id: &str) -> Result<Option<Group>>;
    /// False for unknown groups as well as for non-members
    async fn is_member(&self, group_id: &str, username: &str) -> Result<bool>;
    async fn groups_for_user(&self, username: &str) -> Result<Vec<Group>>;

    async fn append_message(&self, message: NewMessage) -> Result<Message>;
    /// The most recent `limit` messages matching `filter`, arranged by `order`
    async fn query_messages(
        &self,
        filter: ScopeFilter,
        limit: usize,
        order: Order,
    ) -> Result<Vec<Message>>;
    /// Marks unread private messages from `sender` to `recipient` as read.
    /// Returns how many flipped.
    async fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize>;

    // Request/response surface (users and group management)

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User>;
    async fn password_hash(&self, username: &str) -> Result<Option<String>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn create_group(&self, new_group: NewGroup) -> Result<Group>;
    async fn add_member(&self, group_id: &str, username: &str) -> Result<Group>;
    async fn remove_member(&self, group_id: &str, username: &str) -> Result<Group>;
}
