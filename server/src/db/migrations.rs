use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: identities, groups, message log

CREATE TABLE users (
    username TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    is_online INTEGER NOT NULL DEFAULT 0,
    last_active TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE chat_groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    creator TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE group_members (
    group_id TEXT NOT NULL,
    username TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (group_id, username),
    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE
);

CREATE INDEX idx_group_members_username ON group_members(username);

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL CHECK (scope IN ('global', 'private', 'group')),
    sender TEXT NOT NULL,
    recipient TEXT,
    group_id TEXT,
    text TEXT NOT NULL,
    time TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    CHECK ((scope = 'private') = (recipient IS NOT NULL)),
    CHECK ((scope = 'group') = (group_id IS NOT NULL))
);

CREATE INDEX idx_messages_pair ON messages(sender, recipient);
CREATE INDEX idx_messages_group ON messages(group_id);
CREATE INDEX idx_messages_scope ON messages(scope);
",
        ),
    ])
}
