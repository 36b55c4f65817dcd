// src/llm/client.rs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::memory::types::Role;

/// One entry of the ordered message list submitted to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion response contained no choices")]
    EmptyResponse,
}

/// Stateless adapter over the hosted completion endpoint: one ordered
/// message list in, one assistant reply out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct OpenWebUiClient {
    client: Client,
    api_url: String,
    model: String,
    jwt: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl OpenWebUiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.completion_api_url.clone(),
            model: config.completion_model.clone(),
            jwt: config.completion_jwt.clone(),
        }
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json");
        if let Some(jwt) = &self.jwt {
            builder = builder.header("Authorization", format!("Bearer {}", jwt));
        }
        builder
    }

    /// Startup reachability check. Failures are reported, never fatal.
    pub async fn probe(&self) -> Result<(), CompletionError> {
        let mut builder = self.client.head(&self.api_url);
        if let Some(jwt) = &self.jwt {
            builder = builder.header("Authorization", format!("Bearer {}", jwt));
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(CompletionError::Api {
                status: response.status(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionService for OpenWebUiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .request()
            .json(&payload)
            .send()
            .await
            .map_err(CompletionError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Api { status, body }.into());
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(CompletionError::Transport)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?;
        Ok(choice.message.content)
    }
}
