// src/memory/traits.rs

//! Core trait for the message store backend. All persistence and retrieval
//! go through this seam; business logic never touches the database directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::memory::types::{Role, StoredMessage};

/// Outcome of a binding insert. A duplicate identity is an expected
/// condition (two first contacts racing), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingInsert {
    Inserted,
    AlreadyExists,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create the conversation row if it does not exist yet. Idempotent.
    async fn ensure_conversation(&self, id: &str) -> anyhow::Result<()>;

    /// Append one turn to a conversation's log.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
        embedding: Option<Vec<f32>>,
    ) -> anyhow::Result<()>;

    /// Full ordered history, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> anyhow::Result<Vec<StoredMessage>>;

    /// Drop the conversation's entire message set and store `messages`
    /// in the given order. The only mutation besides append.
    async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> anyhow::Result<()>;

    /// Top-k messages of the conversation by embedding similarity,
    /// most similar first. Rows without an embedding are never returned.
    async fn nearest_messages(
        &self,
        conversation_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<StoredMessage>>;

    /// Conversation bound to a normalized external identity, if any.
    async fn get_binding(&self, identity: &str) -> anyhow::Result<Option<String>>;

    /// Insert a binding; reports `AlreadyExists` when the identity is
    /// already bound (the uniqueness constraint rejected the insert).
    async fn create_binding(
        &self,
        identity: &str,
        conversation_id: &str,
    ) -> anyhow::Result<BindingInsert>;
}
