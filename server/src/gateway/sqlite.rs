use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::time::Duration;
use uuid::Uuid;

use super::{Gateway, GatewayError, Order, Result, ScopeFilter};
use crate::db::models::{now_timestamp, Group, Message, NewGroup, NewMessage, Scope, User};
use crate::db::DbPool;

const MESSAGE_COLUMNS: &str =
    "id, scope, sender, recipient, group_id, text, time, read, created_at";

/// SQLite-backed gateway.
/// Every call runs on the blocking pool and is bounded by `timeout`, so a
/// wedged database turns into [GatewayError::Timeout] instead of a hung handler.
#[derive(Clone)]
pub struct SqliteGateway {
    db: DbPool,
    timeout: Duration,
}

impl SqliteGateway {
    pub fn new(db: DbPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Clear every persisted online flag. Returns how many were set.
    pub async fn reset_online(&self) -> Result<usize> {
        self.run(|conn| Ok(conn.execute("UPDATE users SET is_online = 0 WHERE is_online = 1", [])?))
            .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| GatewayError::Internal(format!("DB lock error: {}", e)))?;
            f(&conn)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(GatewayError::Internal(join_error.to_string())),
            Err(_) => Err(GatewayError::Timeout),
        }
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        is_online: row.get(1)?,
        last_active: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let scope: String = row.get(1)?;
    let scope = Scope::from_str(&scope).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, "unknown message scope".into())
    })?;

    Ok(Message {
        id: row.get(0)?,
        scope,
        sender: row.get(2)?,
        recipient: row.get(3)?,
        group_id: row.get(4)?,
        text: row.get(5)?,
        time: row.get(6)?,
        read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn group_members(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT username FROM group_members WHERE group_id = ?1 ORDER BY position ASC",
    )?;
    let members = stmt
        .query_map(params![group_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(members)
}

fn load_group(conn: &Connection, group_id: &str) -> rusqlite::Result<Option<Group>> {
    let row = conn
        .query_row(
            "SELECT id, name, creator, created_at FROM chat_groups WHERE id = ?1",
            params![group_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, creator, created_at)) = row else {
        return Ok(None);
    };

    let members = group_members(conn, &id)?;
    Ok(Some(Group {
        id,
        name,
        creator,
        members,
        created_at,
    }))
}

fn require_group(conn: &Connection, group_id: &str) -> Result<Group> {
    load_group(conn, group_id)?.ok_or_else(|| GatewayError::NotFound {
        resource: "group",
        identifier: group_id.to_string(),
    })
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.run(move |conn| {
            let user = conn
                .query_row(
                    "SELECT username, is_online, last_active, created_at FROM users WHERE username = ?1",
                    params![username],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn set_online(&self, username: &str, online: bool) -> Result<()> {
        let username = username.to_string();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET is_online = ?2, last_active = ?3 WHERE username = ?1",
                params![username, online, now_timestamp()],
            )?;
            if updated == 0 {
                return Err(GatewayError::NotFound {
                    resource: "user",
                    identifier: username,
                });
            }
            Ok(())
        })
        .await
    }

    async fn list_online(&self) -> Result<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT username FROM users WHERE is_online = 1 ORDER BY username ASC")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
        .await
    }

    async fn find_group(&self, group_id: &str) -> Result<Option<Group>> {
        let group_id = group_id.to_string();
        self.run(move |conn| Ok(load_group(conn, &group_id)?)).await
    }

    async fn is_member(&self, group_id: &str, username: &str) -> Result<bool> {
        let group_id = group_id.to_string();
        let username = username.to_string();
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM group_members WHERE group_id = ?1 AND username = ?2",
                    params![group_id, username],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn groups_for_user(&self, username: &str) -> Result<Vec<Group>> {
        let username = username.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id FROM chat_groups g
                 JOIN group_members m ON m.group_id = g.id
                 WHERE m.username = ?1
                 ORDER BY g.created_at ASC, g.id ASC",
            )?;
            let ids = stmt
                .query_map(params![username], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut groups = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(group) = load_group(conn, &id)? {
                    groups.push(group);
                }
            }
            Ok(groups)
        })
        .await
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message> {
        self.run(move |conn| {
            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO messages (scope, sender, recipient, group_id, text, time, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    message.scope().as_str(),
                    message.sender(),
                    message.recipient(),
                    message.group_id(),
                    message.text(),
                    message.time(),
                    created_at,
                ],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                scope: message.scope(),
                sender: message.sender().to_string(),
                recipient: message.recipient().map(str::to_string),
                group_id: message.group_id().map(str::to_string),
                text: message.text().to_string(),
                time: message.time().to_string(),
                read: false,
                created_at,
            })
        })
        .await
    }

    async fn query_messages(
        &self,
        filter: ScopeFilter,
        limit: usize,
        order: Order,
    ) -> Result<Vec<Message>> {
        self.run(move |conn| {
            let (condition, mut values) = match filter {
                ScopeFilter::Global => ("scope = 'global'", vec![]),
                ScopeFilter::Private { a, b } => (
                    "scope = 'private' AND ((sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1))",
                    vec![Value::Text(a), Value::Text(b)],
                ),
                ScopeFilter::Group { group_id } => {
                    ("scope = 'group' AND group_id = ?1", vec![Value::Text(group_id)])
                }
            };
            let limit_index = values.len() + 1;
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

            let sql = format!(
                "SELECT {} FROM messages WHERE {} ORDER BY id DESC LIMIT ?{}",
                MESSAGE_COLUMNS, condition, limit_index
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut messages = stmt
                .query_map(params_from_iter(values.iter()), message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            if order == Order::OldestFirst {
                messages.reverse();
            }
            Ok(messages)
        })
        .await
    }

    async fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize> {
        let sender = sender.to_string();
        let recipient = recipient.to_string();
        self.run(move |conn| {
            let flipped = conn.execute(
                "UPDATE messages SET read = 1
                 WHERE scope = 'private' AND sender = ?1 AND recipient = ?2 AND read = 0",
                params![sender, recipient],
            )?;
            Ok(flipped)
        })
        .await
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        self.run(move |conn| {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1",
                    params![username],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_some() {
                return Err(GatewayError::Conflict {
                    resource: "user",
                    field: "username",
                    value: username,
                });
            }

            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO users (username, password_hash, is_online, last_active, created_at)
                 VALUES (?1, ?2, 0, NULL, ?3)",
                params![username, password_hash, created_at],
            )?;

            Ok(User {
                username,
                is_online: false,
                last_active: None,
                created_at,
            })
        })
        .await
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>> {
        let username = username.to_string();
        self.run(move |conn| {
            let hash = conn
                .query_row(
                    "SELECT password_hash FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hash)
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, is_online, last_active, created_at FROM users ORDER BY username ASC",
            )?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
        .await
    }

    async fn create_group(&self, new_group: NewGroup) -> Result<Group> {
        self.run(move |conn| {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM chat_groups WHERE name = ?1",
                    params![new_group.name],
                    |_| Ok(()),
                )
                .optional()?;
            if taken.is_some() {
                return Err(GatewayError::Conflict {
                    resource: "group",
                    field: "name",
                    value: new_group.name,
                });
            }

            let id = Uuid::now_v7().to_string();
            let created_at = now_timestamp();
            let members = new_group.member_list();

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chat_groups (id, name, creator, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, new_group.name, new_group.creator, created_at],
            )?;
            for (position, member) in members.iter().enumerate() {
                tx.execute(
                    "INSERT INTO group_members (group_id, username, position) VALUES (?1, ?2, ?3)",
                    params![id, member, position as i64],
                )?;
            }
            tx.commit()?;

            Ok(Group {
                id,
                name: new_group.name,
                creator: new_group.creator,
                members,
                created_at,
            })
        })
        .await
    }

    async fn add_member(&self, group_id: &str, username: &str) -> Result<Group> {
        let group_id = group_id.to_string();
        let username = username.to_string();
        self.run(move |conn| {
            let group = require_group(conn, &group_id)?;
            if group.has_member(&username) {
                return Err(GatewayError::Conflict {
                    resource: "group member",
                    field: "username",
                    value: username,
                });
            }

            conn.execute(
                "INSERT INTO group_members (group_id, username, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM group_members WHERE group_id = ?1))",
                params![group_id, username],
            )?;

            require_group(conn, &group_id)
        })
        .await
    }

    async fn remove_member(&self, group_id: &str, username: &str) -> Result<Group> {
        let group_id = group_id.to_string();
        let username = username.to_string();
        self.run(move |conn| {
            let group = require_group(conn, &group_id)?;
            if !group.has_member(&username) {
                return Err(GatewayError::NotFound {
                    resource: "group member",
                    identifier: username,
                });
            }

            conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND username = ?2",
                params![group_id, username],
            )?;

            require_group(conn, &group_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    fn gateway() -> SqliteGateway {
        SqliteGateway::new(
            init_memory_db().expect("Failed to init DB"),
            Duration::from_secs(5),
        )
    }

    async fn seed_users(gateway: &SqliteGateway, names: &[&str]) {
        for name in names {
            gateway.create_user(name, "hash").await.unwrap();
        }
    }

    #[tokio::test]
    async fn create_user_rejects_duplicates() {
        let gateway = gateway();
        gateway.create_user("alice", "hash").await.unwrap();

        let err = gateway.create_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { field: "username", .. }));
    }

    #[tokio::test]
    async fn set_online_updates_flag_and_last_active() {
        let gateway = gateway();
        seed_users(&gateway, &["alice", "bob"]).await;

        gateway.set_online("alice", true).await.unwrap();
        assert_eq!(gateway.list_online().await.unwrap(), vec!["alice"]);

        let alice = gateway.find_user("alice").await.unwrap().unwrap();
        assert!(alice.is_online);
        assert!(alice.last_active.is_some());

        gateway.set_online("alice", false).await.unwrap();
        assert!(gateway.list_online().await.unwrap().is_empty());

        gateway.set_online("alice", true).await.unwrap();
        gateway.set_online("bob", true).await.unwrap();
        assert_eq!(gateway.reset_online().await.unwrap(), 2);
        assert!(gateway.list_online().await.unwrap().is_empty());

        let err = gateway.set_online("nobody", true).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { resource: "user", .. }));
    }

    #[tokio::test]
    async fn group_membership_round_trip() {
        let gateway = gateway();
        let group = gateway
            .create_group(NewGroup {
                name: "team".to_string(),
                creator: "alice".to_string(),
                members: vec!["bob".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(group.members, vec!["alice", "bob"]);
        assert_eq!(gateway.find_group(&group.id).await.unwrap(), Some(group.clone()));
        assert_eq!(gateway.find_group("missing").await.unwrap(), None);
        assert!(gateway.is_member(&group.id, "bob").await.unwrap());
        assert!(!gateway.is_member(&group.id, "dave").await.unwrap());
        assert!(!gateway.is_member("missing", "alice").await.unwrap());

        let group = gateway.add_member(&group.id, "carol").await.unwrap();
        assert_eq!(group.members, vec!["alice", "bob", "carol"]);

        let err = gateway.add_member(&group.id, "carol").await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { resource: "group member", .. }));

        let group = gateway.remove_member(&group.id, "bob").await.unwrap();
        assert_eq!(group.members, vec!["alice", "carol"]);

        let err = gateway.remove_member(&group.id, "bob").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { resource: "group member", .. }));

        let err = gateway.add_member("missing", "bob").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { resource: "group", .. }));

        let groups = gateway.groups_for_user("carol").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "team");
        assert!(gateway.groups_for_user("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_names_are_unique() {
        let gateway = gateway();
        let new_group = NewGroup {
            name: "team".to_string(),
            creator: "alice".to_string(),
            members: vec![],
        };
        gateway.create_group(new_group.clone()).await.unwrap();

        let err = gateway.create_group(new_group).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { field: "name", .. }));
    }

    #[tokio::test]
    async fn query_returns_most_recent_window_in_requested_order() {
        let gateway = gateway();
        for i in 0..5 {
            gateway
                .append_message(NewMessage::global("alice", &format!("m{}", i)))
                .await
                .unwrap();
        }
        gateway
            .append_message(NewMessage::private("alice", "bob", "private"))
            .await
            .unwrap();

        let oldest_first = gateway
            .query_messages(ScopeFilter::Global, 3, Order::OldestFirst)
            .await
            .unwrap();
        let texts: Vec<_> = oldest_first.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);

        let newest_first = gateway
            .query_messages(ScopeFilter::Global, 2, Order::NewestFirst)
            .await
            .unwrap();
        let texts: Vec<_> = newest_first.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m3"]);

        let everything = gateway
            .query_messages(ScopeFilter::Global, usize::MAX, Order::OldestFirst)
            .await
            .unwrap();
        assert_eq!(everything.len(), 5);
    }

    #[tokio::test]
    async fn private_filter_matches_both_directions_only() {
        let gateway = gateway();
        gateway
            .append_message(NewMessage::private("alice", "bob", "a->b"))
            .await
            .unwrap();
        gateway
            .append_message(NewMessage::private("bob", "alice", "b->a"))
            .await
            .unwrap();
        gateway
            .append_message(NewMessage::private("alice", "carol", "a->c"))
            .await
            .unwrap();

        let thread = gateway
            .query_messages(
                ScopeFilter::Private {
                    a: "bob".to_string(),
                    b: "alice".to_string(),
                },
                50,
                Order::OldestFirst,
            )
            .await
            .unwrap();
        let texts: Vec<_> = thread.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a->b", "b->a"]);
    }

    #[tokio::test]
    async fn mark_read_only_flips_one_direction_once() {
        let gateway = gateway();
        gateway
            .append_message(NewMessage::private("alice", "bob", "one"))
            .await
            .unwrap();
        gateway
            .append_message(NewMessage::private("alice", "bob", "two"))
            .await
            .unwrap();
        gateway
            .append_message(NewMessage::private("bob", "alice", "reply"))
            .await
            .unwrap();

        assert_eq!(gateway.mark_read("alice", "bob").await.unwrap(), 2);
        assert_eq!(gateway.mark_read("alice", "bob").await.unwrap(), 0);

        let thread = gateway
            .query_messages(
                ScopeFilter::Private {
                    a: "alice".to_string(),
                    b: "bob".to_string(),
                },
                50,
                Order::OldestFirst,
            )
            .await
            .unwrap();
        let flags: Vec<_> = thread.iter().map(|m| (m.sender.as_str(), m.read)).collect();
        assert_eq!(flags, vec![("alice", true), ("alice", true), ("bob", false)]);
    }

    #[tokio::test]
    async fn stuck_backend_times_out() {
        let db = init_memory_db().unwrap();
        let gateway = SqliteGateway::new(db.clone(), Duration::from_millis(50));

        let holder = std::thread::spawn(move || {
            let _guard = db.lock().unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        std::thread::sleep(Duration::from_millis(20));

        let err = gateway.find_user("alice").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
        holder.join().unwrap();
    }
}
