// src/whatsapp/session.rs
// Persistent client for the gateway's event stream. Owns the connection
// lifecycle: startup validation, connect, dispatch, bounded-backoff
// reconnect. Constructed once by the composition root and started after a
// short delay; stopped only at process shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, EvolutionSettings};
use crate::services::{ContextAssembler, IdentityBinder};
use crate::whatsapp::client::EvolutionClient;
use crate::whatsapp::events::{GatewayEvent, MESSAGE_EVENTS};
use crate::whatsapp::handle_inbound_message;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Connecting = 1,
    Connected = 2,
    Disconnected = 3,
    ShuttingDown = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Disconnected,
            4 => SessionState::ShuttingDown,
            _ => SessionState::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub instance: Option<String>,
    pub initialized: bool,
}

pub struct GatewaySession {
    config: Config,
    binder: Arc<IdentityBinder>,
    assembler: Arc<ContextAssembler>,
    state: AtomicU8,
    initialized: AtomicBool,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    cancel: CancellationToken,
}

impl GatewaySession {
    pub fn new(
        config: Config,
        binder: Arc<IdentityBinder>,
        assembler: Arc<ContextAssembler>,
    ) -> Self {
        Self {
            config,
            binder,
            assembler,
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            initialized: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Validate gateway settings and spawn the connection loop. Runs at most
    /// once; a validation failure aborts initialization and is not retried
    /// (an operator restart is required).
    pub fn start(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let missing = self.config.missing_evolution_vars();
        if !missing.is_empty() {
            error!(
                "Gateway session not started: missing required settings: {}",
                missing.join(", ")
            );
            return;
        }
        let Some(settings) = self.config.evolution() else {
            return;
        };

        info!("Initializing gateway session for instance {}", settings.instance);
        let sender = EvolutionClient::new(&settings);
        let session = self.clone();
        tokio::spawn(async move {
            session.run(settings, sender).await;
        });
    }

    async fn run(self: Arc<Self>, settings: EvolutionSettings, sender: EvolutionClient) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(SessionState::Connecting);

            match self.connect(&settings).await {
                Ok(stream) => {
                    info!("Connected to gateway event stream");
                    self.connected.store(true, Ordering::SeqCst);
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.reconnecting.store(false, Ordering::SeqCst);
                    self.set_state(SessionState::Connected);

                    self.read_events(stream, &sender).await;

                    self.connected.store(false, Ordering::SeqCst);
                    self.set_state(SessionState::Disconnected);
                }
                Err(e) => {
                    warn!("Gateway connection failed: {e:#}");
                    self.set_state(SessionState::Disconnected);
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            // Reentrancy guard: only one pending reconnect sequence at a time.
            if !self.reconnecting.swap(true, Ordering::SeqCst) {
                let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > self.config.max_reconnect_attempts {
                    error!(
                        "Max reconnection attempts ({}) reached; gateway session halted until restart",
                        self.config.max_reconnect_attempts
                    );
                    return;
                }
                let delay = backoff_delay(
                    Duration::from_secs(self.config.reconnect_base_secs),
                    attempt,
                );
                info!(
                    "Reconnection attempt {}/{} in {:.1}s",
                    attempt,
                    self.config.max_reconnect_attempts,
                    delay.as_secs_f64()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => break,
                }
                self.reconnecting.store(false, Ordering::SeqCst);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.set_state(SessionState::ShuttingDown);
    }

    async fn connect(&self, settings: &EvolutionSettings) -> anyhow::Result<WsStream> {
        let url = event_stream_url(&settings.api_url, &settings.instance);
        debug!("Connecting to gateway at {}", url);
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("apikey", HeaderValue::from_str(&settings.api_key)?);
        let (stream, _response) = connect_async(request).await?;
        Ok(stream)
    }

    /// Read frames until the connection closes or errors out.
    async fn read_events(self: &Arc<Self>, mut stream: WsStream, sender: &EvolutionClient) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = stream.close(None).await;
                    return;
                }
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch_event(text.as_str(), sender),
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Gateway closed the connection");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Gateway stream error: {e}");
                        return;
                    }
                    None => {
                        info!("Gateway stream ended");
                        return;
                    }
                }
            }
        }
    }

    fn dispatch_event(self: &Arc<Self>, raw: &str, sender: &EvolutionClient) {
        let event: GatewayEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!("Discarding unparseable gateway frame: {e}");
                return;
            }
        };

        if MESSAGE_EVENTS.contains(&event.event.as_str()) {
            let Some(message) = event.data.first_message().cloned() else {
                debug!("{} event without message payload", event.event);
                return;
            };
            // Events are handled independently; a reply may complete out of
            // order relative to arrival when pipeline latencies differ.
            let session = self.clone();
            let sender = sender.clone();
            tokio::spawn(async move {
                handle_inbound_message(&session.binder, &session.assembler, &sender, &message)
                    .await;
            });
        } else {
            match event.event.as_str() {
                "connection.update" | "qr" | "ready" => {
                    info!("Gateway event: {}", event.event);
                }
                other => debug!("Unhandled gateway event: {}", other),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            instance: self.config.evolution_instance.clone(),
            initialized: self.initialized.load(Ordering::SeqCst),
        }
    }

    /// Idempotent; safe to call from multiple shutdown paths.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Disconnecting from gateway event stream");
        }
        self.cancel.cancel();
        self.set_state(SessionState::ShuttingDown);
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Delay before reconnect attempt `attempt` (1-based): grows by a factor of
/// 1.5 from the base.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(1.5_f64.powi(attempt.saturating_sub(1) as i32))
}

fn event_stream_url(api_url: &str, instance: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/{instance}")
}
