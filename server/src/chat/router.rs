//! Channel router.
//!
//! Classifies outgoing messages by scope, authorizes them, appends exactly one
//! record to the log and only then fans out. Fan-out is best effort and never
//! rolls back the stored record. Authorization failures are dropped without
//! telling the sender so group membership is not leaked.

use std::sync::Arc;

use super::broadcast::send_to_many;
use super::Origin;
use crate::db::models::{display_time, Message, NewMessage};
use crate::gateway::{Gateway, Order, ScopeFilter};
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::ws::protocol::{ChatLine, MessageView, ServerEvent};
use crate::ws::ConnectionRegistry;

/// Why a send was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Text was empty after trimming
    EmptyText,
    /// A required target (recipient or group) was missing
    MissingTarget,
    /// Sender is not allowed to post to the target
    Unauthorized,
    /// The log write or membership lookup failed
    Persistence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored as `message_id` and handed to `recipients` connections
    Delivered { message_id: i64, recipients: usize },
    Dropped(DropReason),
}

pub struct ChannelRouter {
    gateway: Arc<dyn Gateway>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    connections: ConnectionRegistry,
    history_limit: usize,
}

impl ChannelRouter {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        connections: ConnectionRegistry,
        history_limit: usize,
    ) -> Self {
        Self {
            gateway,
            presence,
            rooms,
            connections,
            history_limit,
        }
    }

    async fn persist(&self, message: NewMessage) -> Result<Message, DropReason> {
        if message.text().trim().is_empty() {
            return Err(DropReason::EmptyText);
        }

        self.gateway.append_message(message).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to persist message");
            DropReason::Persistence
        })
    }

    /// Store a global message and deliver it to every authenticated connection,
    /// the sender's included.
    pub async fn send_global(&self, origin: Origin<'_>, text: &str) -> Delivery {
        let stored = match self.persist(NewMessage::global(origin.username, text)).await {
            Ok(stored) => stored,
            Err(reason) => return Delivery::Dropped(reason),
        };

        let event = ServerEvent::Message(ChatLine {
            user: stored.sender,
            text: stored.text,
            time: display_time(),
            id: Some(stored.id),
        });
        let targets = self.presence.bound_connections();
        let recipients = send_to_many(&self.connections, &targets, &event);

        tracing::debug!(
            username = %origin.username,
            message_id = stored.id,
            recipients,
            "Global message delivered"
        );
        Delivery::Delivered {
            message_id: stored.id,
            recipients,
        }
    }

    /// Store a private message, echo it to the sending connection and deliver
    /// it to the recipient's current connection when they are online.
    /// Offline recipients find it through history replay.
    pub async fn send_private(&self, origin: Origin<'_>, recipient: &str, text: &str) -> Delivery {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Delivery::Dropped(DropReason::MissingTarget);
        }

        let stored = match self
            .persist(NewMessage::private(origin.username, recipient, text))
            .await
        {
            Ok(stored) => stored,
            Err(reason) => return Delivery::Dropped(reason),
        };
        let message_id = stored.id;

        let mut targets = vec![origin.connection];
        if let Some(connection) = self.presence.resolve(recipient) {
            if connection != origin.connection {
                targets.push(connection);
            }
        }

        let event = ServerEvent::PrivateMessage(MessageView::from(stored));
        let recipients = send_to_many(&self.connections, &targets, &event);

        tracing::debug!(
            username = %origin.username,
            recipient = %recipient,
            message_id,
            recipients,
            "Private message delivered"
        );
        Delivery::Delivered {
            message_id,
            recipients,
        }
    }

    /// Store a group message and deliver it to every connection joined to the
    /// group's room. Membership is checked against the log on every send.
    pub async fn send_group(&self, origin: Origin<'_>, group_id: &str, text: &str) -> Delivery {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Delivery::Dropped(DropReason::MissingTarget);
        }
        if text.trim().is_empty() {
            return Delivery::Dropped(DropReason::EmptyText);
        }

        match self.gateway.is_member(group_id, origin.username).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    username = %origin.username,
                    group_id = %group_id,
                    "Dropping group message from non-member"
                );
                return Delivery::Dropped(DropReason::Unauthorized);
            }
            Err(e) => {
                tracing::warn!(
                    username = %origin.username,
                    group_id = %group_id,
                    error = %e,
                    "Membership check failed"
                );
                return Delivery::Dropped(DropReason::Persistence);
            }
        }

        let stored = match self
            .persist(NewMessage::group(origin.username, group_id, text))
            .await
        {
            Ok(stored) => stored,
            Err(reason) => return Delivery::Dropped(reason),
        };
        let message_id = stored.id;

        let targets = self.rooms.connections(group_id);
        let event = ServerEvent::GroupMessage(MessageView::from(stored));
        let recipients = send_to_many(&self.connections, &targets, &event);

        tracing::debug!(
            username = %origin.username,
            group_id = %group_id,
            message_id,
            recipients,
            "Group message delivered"
        );
        Delivery::Delivered {
            message_id,
            recipients,
        }
    }

    /// Latest global messages, oldest first. `None` when the log is unavailable.
    pub async fn replay_global(&self) -> Option<Vec<Message>> {
        self.query(ScopeFilter::Global).await
    }

    /// Latest messages between `requester` and `other`, oldest first.
    ///
    /// Messages `other` sent to `requester` are marked read before the window
    /// is read, so the returned records already carry the new flag.
    pub async fn replay_private(&self, requester: &str, other: &str) -> Option<Vec<Message>> {
        let other = other.trim();
        if other.is_empty() {
            tracing::debug!(username = %requester, "Ignoring private history request without peer");
            return None;
        }

        match self.gateway.mark_read(other, requester).await {
            Ok(flipped) if flipped > 0 => {
                tracing::debug!(
                    username = %requester,
                    other = %other,
                    flipped,
                    "Marked private messages read"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    username = %requester,
                    other = %other,
                    error = %e,
                    "Failed to mark private messages read"
                );
            }
        }

        self.query(ScopeFilter::Private {
            a: requester.to_string(),
            b: other.to_string(),
        })
        .await
    }

    /// Latest messages of a group, oldest first. Non-members get nothing.
    pub async fn replay_group(&self, requester: &str, group_id: &str) -> Option<Vec<Message>> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            tracing::debug!(username = %requester, "Ignoring group history request without group");
            return None;
        }

        match self.gateway.is_member(group_id, requester).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    username = %requester,
                    group_id = %group_id,
                    "Refusing group history to non-member"
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(group_id = %group_id, error = %e, "Membership check failed");
                return None;
            }
        }

        self.query(ScopeFilter::Group {
            group_id: group_id.to_string(),
        })
        .await
    }

    async fn query(&self, filter: ScopeFilter) -> Option<Vec<Message>> {
        match self
            .gateway
            .query_messages(filter.clone(), self.history_limit, Order::OldestFirst)
            .await
        {
            Ok(messages) => Some(messages),
            Err(e) => {
                tracing::warn!(filter = ?filter, error = %e, "History query failed");
                None
            }
        }
    }
}
