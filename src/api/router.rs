// src/api/router.rs
// HTTP router composition for the exposed boundary.

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::json;

use super::chat::chat_handler;
use super::whatsapp::{status_handler, webhook_handler, webhook_verify_handler};
use crate::state::AppState;

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route(
            "/whatsapp/webhook",
            post(webhook_handler).get(webhook_verify_handler),
        )
        .route("/whatsapp/status", get(status_handler))
        .with_state(app_state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
