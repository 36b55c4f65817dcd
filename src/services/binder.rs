// src/services/binder.rs
// Maps a WhatsApp identity to its durable conversation. One binding per
// normalized identity, created on first contact, never reassigned.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::memory::traits::{BindingInsert, MessageStore};

pub struct IdentityBinder {
    store: Arc<dyn MessageStore>,
}

impl IdentityBinder {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Resolve the conversation bound to `external_identity`, creating the
    /// binding on first contact. Losing a concurrent first-contact race is
    /// handled by re-reading the winner's binding.
    pub async fn resolve_conversation(&self, external_identity: &str) -> Result<String> {
        let identity = normalize_identity(external_identity);
        if identity.is_empty() {
            anyhow::bail!("identity '{}' contains no digits", external_identity);
        }

        if let Some(conversation_id) = self.store.get_binding(&identity).await? {
            // Self-heal: the conversation row may be missing if a prior
            // first contact failed between binding and conversation insert.
            self.store.ensure_conversation(&conversation_id).await?;
            debug!("Identity {} already bound to {}", identity, conversation_id);
            return Ok(conversation_id);
        }

        let conversation_id = Uuid::new_v4().to_string();
        self.store.ensure_conversation(&conversation_id).await?;

        match self.store.create_binding(&identity, &conversation_id).await? {
            BindingInsert::Inserted => {
                info!("Bound identity {} to new conversation {}", identity, conversation_id);
                Ok(conversation_id)
            }
            BindingInsert::AlreadyExists => {
                // Lost the race: another first contact bound this identity
                // between our lookup and insert. The winner's row is
                // authoritative; ours is abandoned.
                let winner = self
                    .store
                    .get_binding(&identity)
                    .await?
                    .context("binding missing after duplicate insert")?;
                info!("Identity {} was bound concurrently; using {}", identity, winner);
                Ok(winner)
            }
        }
    }
}

/// Strip everything but digits: `+55 (11) 99999-0000` and
/// `5511999990000@s.whatsapp.net` normalize to the same key.
fn normalize_identity(identity: &str) -> String {
    identity.chars().filter(|c| c.is_ascii_digit()).collect()
}
