// tests/rest_chat.rs


use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use test_helpers::{ScriptedCompletion, StubEmbeddings, build_state};
use zapbridge::services::FALLBACK_REPLY;
use zapbridge::state::AppState;

async fn build_router(completion: Arc<ScriptedCompletion>) -> (Router, Arc<AppState>) {
    let (state, _pool) = build_state(completion, StubEmbeddings::uniform()).await;
    (zapbridge::api::router(state.clone()), state)
}

async fn post_json(router: &Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn two_turn_web_chat_carries_the_first_turn_into_the_second_context() {
    let completion = ScriptedCompletion::with_replies(&["Oi! Como posso ajudar?", "Que bom!"]);
    let (router, _state) = build_router(completion.clone()).await;

    let (status, body) = post_json(
        &router,
        "/chat",
        serde_json::json!({ "message": "Olá" }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Oi! Como posso ajudar?");
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();
    assert!(!conversation_id.is_empty());

    let (status, body) = post_json(
        &router,
        "/chat",
        serde_json::json!({ "message": "Tudo bem?", "conversationId": conversation_id })
            .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Que bom!");
    assert_eq!(body["conversationId"], conversation_id);

    // The second submitted window must contain both turns of the first
    // exchange ahead of the new message.
    let calls = completion.calls();
    assert_eq!(calls.len(), 2);
    let second_window: Vec<&str> = calls[1].iter().map(|m| m.content.as_str()).collect();
    assert!(second_window.contains(&"Olá"));
    assert!(second_window.contains(&"Oi! Como posso ajudar?"));
    assert_eq!(*second_window.last().unwrap(), "Tudo bem?");
}

#[tokio::test]
async fn completion_failure_yields_the_apology_with_success_status() {
    let (router, _state) = build_router(ScriptedCompletion::failing()).await;

    let (status, body) = post_json(
        &router,
        "/chat",
        serde_json::json!({ "message": "Olá" }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], FALLBACK_REPLY);
    assert!(!body["conversationId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn blank_message_is_a_server_error_with_details() {
    let (router, _state) = build_router(ScriptedCompletion::with_replies(&[])).await;

    let (status, body) = post_json(
        &router,
        "/chat",
        serde_json::json!({ "message": "   " }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn malformed_json_is_rejected_client_side() {
    let (router, _state) = build_router(ScriptedCompletion::with_replies(&[])).await;

    let (status, _body) = post_json(&router, "/chat", "{not:json".to_string()).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn health_and_gateway_status_endpoints_respond() {
    let (router, _state) = build_router(ScriptedCompletion::with_replies(&[])).await;

    let (status, body) = get_json(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&router, "/whatsapp/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["instance"], "test");

    let (status, body) = get_json(&router, "/whatsapp/webhook").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
