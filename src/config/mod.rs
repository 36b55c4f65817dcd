// src/config/mod.rs
// All values come from the environment (.env first, then process env).
// Missing required variables abort startup; tunables fall back to defaults.

use std::str::FromStr;

use anyhow::Result;
use tracing::Level;

#[derive(Debug, Clone)]
pub struct Config {
    // ── Completion endpoint (OpenWebUI or any OpenAI-compatible server)
    pub completion_api_url: String,
    pub completion_model: String,
    pub completion_jwt: Option<String>,

    // ── Embeddings (optional; relevance retrieval degrades without it)
    pub openai_api_key: Option<String>,

    // ── Database
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Evolution API gateway (optional at startup; the session validates)
    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub evolution_instance: Option<String>,

    // ── Server
    pub host: String,
    pub port: u16,
    pub log_level: String,

    // ── Context assembly
    pub max_context_tokens: usize,
    pub vector_search_k: usize,

    // ── Gateway session
    pub reconnect_base_secs: u64,
    pub max_reconnect_attempts: u32,
    pub startup_delay_secs: u64,
}

/// Gateway connection parameters, available only when all three are configured.
#[derive(Debug, Clone)]
pub struct EvolutionSettings {
    pub api_url: String,
    pub api_key: String,
    pub instance: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_var_required(key: &'static str, missing: &mut Vec<&'static str>) -> String {
    match env_var_opt(key) {
        Some(v) => v,
        None => {
            missing.push(key);
            String::new()
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_err() {
            eprintln!("Warning: .env file not found. Using environment variables and defaults.");
        }

        let mut missing = Vec::new();
        let completion_api_url = env_var_required("OPEN_WEBUI_API_URL", &mut missing);
        let completion_model = env_var_required("OPEN_WEBUI_MODEL", &mut missing);

        if !missing.is_empty() {
            anyhow::bail!(
                "missing required environment variables: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            completion_api_url,
            completion_model,
            completion_jwt: env_var_opt("OPEN_WEBUI_JWT"),
            openai_api_key: env_var_opt("OPENAI_API_KEY"),
            database_url: env_var_or("DATABASE_URL", "sqlite:./zapbridge.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 5),
            evolution_api_url: env_var_opt("EVOLUTION_API_URL"),
            evolution_api_key: env_var_opt("EVOLUTION_API_KEY"),
            evolution_instance: env_var_opt("EVOLUTION_INSTANCE_NAME"),
            host: env_var_or("ZAPBRIDGE_HOST", "0.0.0.0".to_string()),
            port: env_var_or("ZAPBRIDGE_PORT", 3000),
            log_level: env_var_or("ZAPBRIDGE_LOG_LEVEL", "info".to_string()),
            max_context_tokens: env_var_or("ZAPBRIDGE_MAX_TOKENS", 3500),
            vector_search_k: env_var_or("ZAPBRIDGE_VECTOR_SEARCH_K", 5),
            reconnect_base_secs: env_var_or("ZAPBRIDGE_RECONNECT_BASE_SECS", 5),
            max_reconnect_attempts: env_var_or("ZAPBRIDGE_MAX_RECONNECT_ATTEMPTS", 10),
            startup_delay_secs: env_var_or("ZAPBRIDGE_STARTUP_DELAY_SECS", 1),
        })
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tracing_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }

    /// Gateway settings when fully configured, `None` otherwise.
    pub fn evolution(&self) -> Option<EvolutionSettings> {
        Some(EvolutionSettings {
            api_url: self.evolution_api_url.clone()?,
            api_key: self.evolution_api_key.clone()?,
            instance: self.evolution_instance.clone()?,
        })
    }

    /// Names of gateway variables that are still unset.
    pub fn missing_evolution_vars(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.evolution_api_url.is_none() {
            missing.push("EVOLUTION_API_URL");
        }
        if self.evolution_api_key.is_none() {
            missing.push("EVOLUTION_API_KEY");
        }
        if self.evolution_instance.is_none() {
            missing.push("EVOLUTION_INSTANCE_NAME");
        }
        missing
    }
}
