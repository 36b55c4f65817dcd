// src/whatsapp/mod.rs

pub mod client;
pub mod events;
pub mod session;

pub use client::EvolutionClient;
pub use session::{GatewaySession, SessionStatus};

use tracing::{debug, error, info};

use crate::services::{ContextAssembler, FALLBACK_REPLY, IdentityBinder};
use events::InboundMessage;

/// Shared inbound pipeline for both the live event stream and the HTTP
/// webhook fallback: discard own/empty messages, resolve the conversation,
/// build the reply, send it back. A binder failure drops the event; a reply
/// failure answers with the fixed fallback text instead.
pub async fn handle_inbound_message(
    binder: &IdentityBinder,
    assembler: &ContextAssembler,
    sender: &EvolutionClient,
    message: &InboundMessage,
) {
    if message.from_me {
        debug!("Ignoring own message");
        return;
    }
    let Some(text) = message.text() else {
        debug!("No text content in message");
        return;
    };

    info!("Processing message from {}", message.from);

    let conversation_id = match binder.resolve_conversation(&message.from).await {
        Ok(id) => id,
        Err(e) => {
            error!("Dropping message from {}: binder failed: {e:#}", message.from);
            return;
        }
    };

    let reply = match assembler.build_reply(&conversation_id, text).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Reply pipeline failed for {}: {e:#}", conversation_id);
            FALLBACK_REPLY.to_string()
        }
    };

    if let Err(e) = sender.send_text(&message.from, &reply).await {
        error!("Failed to send WhatsApp reply to {}: {e:#}", message.from);
    }
}
