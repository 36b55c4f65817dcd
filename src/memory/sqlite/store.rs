//! Implements MessageStore for SQLite. Nearest-neighbor retrieval ranks the
//! conversation's embedded rows by cosine similarity in-process; the scan is
//! bounded by a single conversation's history.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::llm::embeddings::utils::cosine_similarity;
use crate::memory::traits::{BindingInsert, MessageStore};
use crate::memory::types::{Role, StoredMessage};

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Helper to convert Vec<f32> to Vec<u8> for BLOB storage
    fn embedding_to_blob(embedding: &Option<Vec<f32>>) -> Option<Vec<u8>> {
        embedding
            .as_ref()
            .map(|vec| vec.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>())
    }

    // Helper to convert BLOB (Vec<u8>) to Vec<f32>
    fn blob_to_embedding(blob: Option<Vec<u8>>) -> Option<Vec<f32>> {
        blob.map(|bytes| {
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
                .collect()
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
        let role: String = row.get("role");
        let timestamp: NaiveDateTime = row.get("created_at");
        Ok(StoredMessage {
            id: Some(row.get("id")),
            conversation_id: row.get("conversation_id"),
            role: role.parse::<Role>()?,
            content: row.get("content"),
            created_at: Utc.from_utc_datetime(&timestamp),
            embedding: Self::blob_to_embedding(row.get("embedding")),
        })
    }

    async fn insert_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
        embedding: &Option<Vec<f32>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at, embedding)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at.naive_utc())
        .bind(Self::embedding_to_blob(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn ensure_conversation(&self, id: &str) -> Result<()> {
        // INSERT OR IGNORE: an existing row is success, not an error.
        sqlx::query("INSERT OR IGNORE INTO conversations (id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
        embedding: Option<Vec<f32>>,
    ) -> Result<()> {
        self.insert_message(conversation_id, role, content, created_at, &embedding)
            .await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        // The id tiebreak keeps insertion order for turns that share a timestamp,
        // preserving the non-decreasing created_at ordering guarantee.
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, embedding
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        for message in messages {
            self.insert_message(
                conversation_id,
                message.role,
                &message.content,
                message.created_at,
                &message.embedding,
            )
            .await?;
        }
        Ok(())
    }

    async fn nearest_messages(
        &self,
        conversation_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, embedding
            FROM messages
            WHERE conversation_id = ? AND embedding IS NOT NULL
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let message = Self::row_to_message(row)?;
            let score = message
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(embedding, e))
                .unwrap_or(0.0);
            scored.push((score, message));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, m)| m).collect())
    }

    async fn get_binding(&self, identity: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT conversation_id FROM whatsapp_bindings WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("conversation_id")))
    }

    async fn create_binding(
        &self,
        identity: &str,
        conversation_id: &str,
    ) -> Result<BindingInsert> {
        let result = sqlx::query(
            "INSERT INTO whatsapp_bindings (identity, conversation_id) VALUES (?, ?)",
        )
        .bind(identity)
        .bind(conversation_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(BindingInsert::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(BindingInsert::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }
}
