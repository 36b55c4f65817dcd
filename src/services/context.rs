// src/services/context.rs
// The context assembler: rebuilds the bounded message window for one reply.
// Recent history + vector-retrieved turns, deduplicated, compressed to a
// token budget, submitted, and both new turns persisted on success.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use crate::llm::client::{ChatMessage, CompletionService};
use crate::llm::embeddings::EmbeddingProvider;
use crate::memory::traits::MessageStore;
use crate::memory::types::Role;

/// Label prepended to the synthetic system message that replaces
/// compressed-away history.
pub const SUMMARY_LABEL: &str = "Resumo da conversa anterior: ";

pub struct ContextAssembler {
    store: Arc<dyn MessageStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionService>,
    max_context_tokens: usize,
    vector_search_k: usize,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionService>,
        max_context_tokens: usize,
        vector_search_k: usize,
    ) -> Self {
        Self {
            store,
            embeddings,
            completion,
            max_context_tokens,
            vector_search_k,
        }
    }

    /// Build the context window for `new_message`, obtain the assistant
    /// reply, and persist both turns (user first). Embedding failures
    /// degrade to recency-only context; store and completion failures
    /// fail the whole call.
    pub async fn build_reply(&self, conversation_id: &str, new_message: &str) -> Result<String> {
        let history = self.store.list_messages(conversation_id).await?;

        let embedding = match self.embeddings.embed(new_message).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Failed to embed inbound message: {e:#}");
                None
            }
        };
        let relevant = match &embedding {
            Some(embedding) => {
                self.store
                    .nearest_messages(conversation_id, embedding, self.vector_search_k)
                    .await?
            }
            None => Vec::new(),
        };

        debug!(
            "Assembling context for {}: {} history, {} relevant",
            conversation_id,
            history.len(),
            relevant.len()
        );

        let history = history
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content));
        let relevant = relevant
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content));
        let mut window = merge_deduped(history.chain(relevant));
        window.push(ChatMessage::new(Role::User, new_message));

        compress_to_budget(&mut window, self.max_context_tokens);

        let reply = self.completion.complete(&window).await?;

        // Persist only after the completion succeeded: user turn, then
        // assistant turn. The inbound embedding is reused for the user row.
        self.store.ensure_conversation(conversation_id).await?;
        self.store
            .append_message(conversation_id, Role::User, new_message, Utc::now(), embedding)
            .await?;
        let reply_embedding = match self.embeddings.embed(&reply).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Failed to embed assistant reply: {e:#}");
                None
            }
        };
        self.store
            .append_message(
                conversation_id,
                Role::Assistant,
                &reply,
                Utc::now(),
                reply_embedding,
            )
            .await?;

        Ok(reply)
    }
}

/// Deduplicate by exact content equality. A duplicated content survives at
/// the position of its last occurrence, so retrieved turns outrank their
/// historical copies in window order.
pub(crate) fn merge_deduped(messages: impl Iterator<Item = ChatMessage>) -> Vec<ChatMessage> {
    let combined: Vec<ChatMessage> = messages.collect();
    let mut last_occurrence: HashMap<String, usize> = HashMap::new();
    for (i, message) in combined.iter().enumerate() {
        last_occurrence.insert(message.content.clone(), i);
    }
    combined
        .into_iter()
        .enumerate()
        .filter(|(i, message)| last_occurrence[&message.content] == *i)
        .map(|(_, message)| message)
        .collect()
}

/// `ceil(len/4)` per message, summed over the window.
pub(crate) fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.len().div_ceil(4)).sum()
}

/// Collapse a span of messages into one synthetic system turn: `role: content`
/// lines joined by newlines under the fixed label. Prior summaries in the
/// span lose their structure with everything else.
pub(crate) fn summarize(messages: &[ChatMessage]) -> ChatMessage {
    let summary = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    ChatMessage::new(Role::System, format!("{SUMMARY_LABEL}{summary}"))
}

/// While the estimate exceeds the budget and more than two messages remain,
/// collapse everything but the last two into a single summary message.
/// Collapsing concatenates rather than truncates, so a pass can fail to
/// shrink the estimate; stop as soon as one does, or the loop never ends.
pub(crate) fn compress_to_budget(window: &mut Vec<ChatMessage>, max_tokens: usize) {
    while estimate_tokens(window) > max_tokens && window.len() > 2 {
        let before = estimate_tokens(window);
        let tail = window.split_off(window.len() - 2);
        let summary = summarize(window);
        window.clear();
        window.push(summary);
        window.extend(tail);
        if estimate_tokens(window) >= before {
            break;
        }
    }
}
