// tests/binder_test.rs


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use test_helpers::{ScriptedCompletion, StubEmbeddings, build_state, memory_pool};
use zapbridge::memory::sqlite::SqliteMessageStore;
use zapbridge::memory::{BindingInsert, MessageStore, Role, StoredMessage};
use zapbridge::services::IdentityBinder;

#[tokio::test]
async fn resolving_twice_returns_the_same_conversation() {
    let (state, _pool) = build_state(
        ScriptedCompletion::with_replies(&[]),
        StubEmbeddings::uniform(),
    )
    .await;

    // Formatting variants of the same number normalize to one identity.
    let first = state
        .binder
        .resolve_conversation("+55 (11) 99999-0000")
        .await
        .unwrap();
    let second = state
        .binder
        .resolve_conversation("5511999990000@s.whatsapp.net")
        .await
        .unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[tokio::test]
async fn concurrent_first_contact_converges_on_one_binding() {
    let (state, pool) = build_state(
        ScriptedCompletion::with_replies(&[]),
        StubEmbeddings::uniform(),
    )
    .await;

    let (first, second) = tokio::join!(
        state.binder.resolve_conversation("5511999990000"),
        state.binder.resolve_conversation("5511999990000"),
    );
    assert_eq!(first.unwrap(), second.unwrap());

    let bindings = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM whatsapp_bindings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(bindings, 1);
}

#[tokio::test]
async fn existing_binding_self_heals_a_missing_conversation_row() {
    let (state, pool) = build_state(
        ScriptedCompletion::with_replies(&[]),
        StubEmbeddings::uniform(),
    )
    .await;

    // Binding row without its conversation: the leftover of a first contact
    // that failed midway.
    state
        .store
        .create_binding("5511999990000", "orphaned-conv")
        .await
        .unwrap();

    let resolved = state
        .binder
        .resolve_conversation("5511999990000")
        .await
        .unwrap();
    assert_eq!(resolved, "orphaned-conv");

    let healed = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM conversations WHERE id = 'orphaned-conv'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(healed, 1);
}

#[tokio::test]
async fn identity_without_digits_is_rejected() {
    let (state, _pool) = build_state(
        ScriptedCompletion::with_replies(&[]),
        StubEmbeddings::uniform(),
    )
    .await;
    assert!(
        state
            .binder
            .resolve_conversation("sem números")
            .await
            .is_err()
    );
}

/// Store wrapper that misreports the first binding lookup as a miss, forcing
/// the binder down the lost-race path against a pre-existing binding.
struct RacingStore {
    inner: SqliteMessageStore,
    lookup_done: AtomicBool,
}

#[async_trait]
impl MessageStore for RacingStore {
    async fn ensure_conversation(&self, id: &str) -> anyhow::Result<()> {
        self.inner.ensure_conversation(id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
        embedding: Option<Vec<f32>>,
    ) -> anyhow::Result<()> {
        self.inner
            .append_message(conversation_id, role, content, created_at, embedding)
            .await
    }

    async fn list_messages(&self, conversation_id: &str) -> anyhow::Result<Vec<StoredMessage>> {
        self.inner.list_messages(conversation_id).await
    }

    async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> anyhow::Result<()> {
        self.inner.replace_messages(conversation_id, messages).await
    }

    async fn nearest_messages(
        &self,
        conversation_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        self.inner
            .nearest_messages(conversation_id, embedding, k)
            .await
    }

    async fn get_binding(&self, identity: &str) -> anyhow::Result<Option<String>> {
        if !self.lookup_done.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_binding(identity).await
    }

    async fn create_binding(
        &self,
        identity: &str,
        conversation_id: &str,
    ) -> anyhow::Result<BindingInsert> {
        self.inner.create_binding(identity, conversation_id).await
    }
}

#[tokio::test]
async fn losing_the_insert_race_returns_the_winners_conversation() {
    let pool = memory_pool().await;
    let winner_store = SqliteMessageStore::new(pool.clone());
    winner_store
        .create_binding("5511999990000", "winner-conv")
        .await
        .unwrap();

    let racing = Arc::new(RacingStore {
        inner: SqliteMessageStore::new(pool.clone()),
        lookup_done: AtomicBool::new(false),
    });
    let binder = IdentityBinder::new(racing);

    // The stale miss sends the binder into create_binding, which the
    // uniqueness constraint rejects; the corrective re-read must surface
    // the winner's id instead of an error.
    let resolved = binder.resolve_conversation("5511999990000").await.unwrap();
    assert_eq!(resolved, "winner-conv");
}
