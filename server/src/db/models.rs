/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use chrono::{Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Which audience a message belongs to. Determines authorization and fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Private,
    Group,
}

impl Scope {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Self::Global),
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

/// Identity record in the users table (password hash excluded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub is_online: bool,
    pub last_active: Option<String>,
    pub created_at: String,
}

/// Named group; `members` keeps insertion order with the creator first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub creator: String,
    pub members: Vec<String>,
    pub created_at: String,
}

impl Group {
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }
}

/// Group creation request. Members are normalised by [NewGroup::member_list].
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub creator: String,
    pub members: Vec<String>,
}

impl NewGroup {
    /// Creator first, then the requested members in order, without duplicates.
    pub fn member_list(&self) -> Vec<String> {
        let mut list = vec![self.creator.clone()];
        for member in &self.members {
            if !list.contains(member) {
                list.push(member.clone());
            }
        }
        list
    }
}

/// Persisted message. Immutable once stored except for `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub scope: Scope,
    pub sender: String,
    pub recipient: Option<String>,
    pub group_id: Option<String>,
    pub text: String,
    pub time: String,
    pub read: bool,
    pub created_at: String,
}

/// A message about to be appended to the log.
/// Only constructible through the scope constructors so that
/// `recipient` is set iff private and `group_id` iff group.
#[derive(Debug, Clone)]
pub struct NewMessage {
    scope: Scope,
    sender: String,
    recipient: Option<String>,
    group_id: Option<String>,
    text: String,
    time: String,
}

impl NewMessage {
    pub fn global(sender: &str, text: &str) -> Self {
        Self::build(Scope::Global, sender, None, None, text)
    }

    pub fn private(sender: &str, recipient: &str, text: &str) -> Self {
        Self::build(Scope::Private, sender, Some(recipient), None, text)
    }

    pub fn group(sender: &str, group_id: &str, text: &str) -> Self {
        Self::build(Scope::Group, sender, None, Some(group_id), text)
    }

    fn build(
        scope: Scope,
        sender: &str,
        recipient: Option<&str>,
        group_id: Option<&str>,
        text: &str,
    ) -> Self {
        Self {
            scope,
            sender: sender.to_string(),
            recipient: recipient.map(str::to_string),
            group_id: group_id.map(str::to_string),
            text: text.to_string(),
            time: display_time(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn time(&self) -> &str {
        &self.time
    }
}

/// Wall-clock time formatted for chat display, e.g. `3:07:42 PM`.
pub fn display_time() -> String {
    Local::now().format("%-I:%M:%S %p").to_string()
}

/// RFC 3339 UTC timestamp with millisecond precision, used for all stored dates.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_list_puts_creator_first_without_duplicates() {
        let new_group = NewGroup {
            name: "team".to_string(),
            creator: "alice".to_string(),
            members: vec!["bob".into(), "alice".into(), "carol".into(), "bob".into()],
        };

        assert_eq!(new_group.member_list(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn scope_constructors_set_exactly_one_target() {
        let global = NewMessage::global("alice", "  hi  ");
        assert_eq!(global.scope(), Scope::Global);
        assert_eq!(global.recipient(), None);
        assert_eq!(global.group_id(), None);
        assert_eq!(global.text(), "  hi  ");

        let private = NewMessage::private("alice", "bob", "psst");
        assert_eq!(private.recipient(), Some("bob"));
        assert_eq!(private.group_id(), None);

        let group = NewMessage::group("alice", "g1", "team");
        assert_eq!(group.recipient(), None);
        assert_eq!(group.group_id(), Some("g1"));
    }

    #[test]
    fn scope_round_trips_through_str() {
        for scope in [Scope::Global, Scope::Private, Scope::Group] {
            assert_eq!(Scope::from_str(scope.as_str()), Some(scope));
        }
        assert_eq!(Scope::from_str("system"), None);
    }
}
