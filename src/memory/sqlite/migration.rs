// src/memory/sqlite/migration.rs
//! Handles migrations for SQLite: ensures tables match the latest schema.
//! Run this at startup to guarantee schema compatibility.

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

const CREATE_CONVERSATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    embedding BLOB
);
"#;

// The PRIMARY KEY on identity is the uniqueness constraint that settles
// concurrent first-contact races: the losing insert is rejected.
const CREATE_WHATSAPP_BINDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS whatsapp_bindings (
    identity TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_id, created_at);
"#;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_CONVERSATIONS).await?;
    pool.execute(CREATE_MESSAGES).await?;
    pool.execute(CREATE_WHATSAPP_BINDINGS).await?;
    pool.execute(CREATE_INDICES).await?;
    Ok(())
}
