// src/services/mod.rs

pub mod binder;
pub mod context;

pub use binder::IdentityBinder;
pub use context::ContextAssembler;

/// Fixed reply used whenever answering an inbound message fails. Sent to the
/// user channel instead of propagating the failure.
pub const FALLBACK_REPLY: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Por favor, tente novamente.";
