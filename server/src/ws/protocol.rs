//! Wire encoding for the chat socket.
//!
//! Every text frame is a JSON object `{"event": <name>, "data": <payload>}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::db::models::{self, Group, Scope};

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    UserLogin { username: String },
    SendMessage { text: String },
    SendPrivateMessage { recipient: String, text: String },
    SendGroupMessage { group_id: String, text: String },
    Typing { recipient: String, is_typing: bool },
    TypingInGroup { group_id: String, is_typing: bool },
    GetGlobalMessages,
    GetPrivateMessages { username: String },
    GetGroupMessages { group_id: String },
}

impl ClientEvent {
    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserLogin { .. } => "userLogin",
            Self::SendMessage { .. } => "sendMessage",
            Self::SendPrivateMessage { .. } => "sendPrivateMessage",
            Self::SendGroupMessage { .. } => "sendGroupMessage",
            Self::Typing { .. } => "typing",
            Self::TypingInGroup { .. } => "typingInGroup",
            Self::GetGlobalMessages => "getGlobalMessages",
            Self::GetPrivateMessages { .. } => "getPrivateMessages",
            Self::GetGroupMessages { .. } => "getGroupMessages",
        }
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// System notices and live global messages
    Message(ChatLine),
    UpdateOnlineUsers(Vec<String>),
    PrivateMessage(MessageView),
    GroupMessage(MessageView),
    GroupList(Vec<GroupView>),
    GroupChatCreated(GroupView),
    UserTyping {
        user: String,
        is_typing: bool,
    },
    UserTypingInGroup {
        user: String,
        group_id: String,
        is_typing: bool,
    },
    GlobalMessageHistory(Vec<MessageView>),
    PrivateMessageHistory {
        username: String,
        messages: Vec<MessageView>,
    },
    GroupMessageHistory {
        group_id: String,
        messages: Vec<MessageView>,
    },
}

/// Sender name used for server-generated notices.
pub const SYSTEM_USER: &str = "System";

/// A line in the global room. `id` is set for persisted user messages only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub user: String,
    pub text: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl ChatLine {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            user: SYSTEM_USER.to_string(),
            text: text.into(),
            time: models::display_time(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    #[serde(rename = "type")]
    pub scope: Scope,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub text: String,
    pub time: String,
    pub read: bool,
    pub created_at: String,
}

impl From<models::Message> for MessageView {
    fn from(message: models::Message) -> Self {
        Self {
            id: message.id,
            scope: message.scope,
            sender: message.sender,
            recipient: message.recipient,
            group_id: message.group_id,
            text: message.text,
            time: message.time,
            read: message.read,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub creator: String,
    pub members: Vec<String>,
    pub created_at: String,
}

impl From<Group> for GroupView {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            creator: group.creator,
            members: group.members,
            created_at: group.created_at,
        }
    }
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}

impl ServerEvent {
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}
