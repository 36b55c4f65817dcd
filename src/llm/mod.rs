// src/llm/mod.rs

pub mod client;
pub mod embeddings;

pub use client::{ChatMessage, CompletionService, OpenWebUiClient};
pub use embeddings::{EmbeddingProvider, OpenAiEmbeddings};
