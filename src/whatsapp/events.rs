// src/whatsapp/events.rs
// Wire shapes for Evolution API events, shared by the webhook fallback and
// the live event stream.

use serde::Deserialize;

/// Envelope of a gateway event, both over the webhook and the socket:
/// `{ "event": "...", "data": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    #[serde(default)]
    pub data: EventData,
}

/// Message events carry either a single `message` or a `messages` batch,
/// depending on the event name variant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    pub message: Option<InboundMessage>,
    pub messages: Option<Vec<InboundMessage>>,
}

impl EventData {
    pub fn first_message(&self) -> Option<&InboundMessage> {
        self.message
            .as_ref()
            .or_else(|| self.messages.as_ref().and_then(|m| m.first()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub from_me: bool,
    pub from: String,
    pub conversation: Option<String>,
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedTextMessage {
    pub text: Option<String>,
}

impl InboundMessage {
    /// Extract the text content: plain `conversation` preferred, the
    /// extended-text field as fallback. Empty strings count as absent.
    pub fn text(&self) -> Option<&str> {
        self.conversation
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.extended_text_message
                    .as_ref()
                    .and_then(|e| e.text.as_deref())
                    .filter(|t| !t.is_empty())
            })
    }
}

/// Event names that carry an inbound message.
pub const MESSAGE_EVENTS: [&str; 2] = ["messages.upsert", "message.create"];
