// src/api/chat.rs

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::services::FALLBACK_REPLY;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
}

/// Web chat endpoint. A missing conversation id starts a fresh conversation;
/// the id actually used is always echoed back. Pipeline failures degrade to
/// the fixed fallback text with a success status so the widget keeps working.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    if request.message.trim().is_empty() {
        return ApiError::internal("message must not be empty").into_response();
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!("Web chat request for conversation {}", conversation_id);

    match state
        .assembler
        .build_reply(&conversation_id, &request.message)
        .await
    {
        Ok(response) => Json(ChatResponse {
            response,
            conversation_id,
        })
        .into_response(),
        Err(e) => {
            error!("Chat pipeline failed for {}: {e:#}", conversation_id);
            Json(ChatResponse {
                response: FALLBACK_REPLY.to_string(),
                conversation_id,
            })
            .into_response()
        }
    }
}
