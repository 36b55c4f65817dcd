// src/whatsapp/client.rs

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::EvolutionSettings;

/// Outbound half of the gateway: plain HTTP calls against the Evolution API.
#[derive(Clone)]
pub struct EvolutionClient {
    http: Client,
    base_url: String,
    api_key: String,
    instance: String,
}

impl EvolutionClient {
    pub fn new(settings: &EvolutionSettings) -> Self {
        Self {
            http: Client::new(),
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            instance: settings.instance.clone(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        debug!("Sending WhatsApp message to {}", to);

        let url = format!("{}/message/sendText/{}", self.base_url, self.instance);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({
                "number": to,
                "options": {
                    "delay": 1200,
                    "presence": "composing",
                },
                "textMessage": {
                    "text": text,
                },
            }))
            .send()
            .await
            .context("Failed to send message to Evolution API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Evolution API error {}: {}", status, body);
        }
        Ok(())
    }
}
