//! HTTP-level tests for the Gemini backend against a local Axum stub.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};

use medresearch::assist::{AssistClient, AssistKind, AssistOutcome, AssistStatus, GeminiClient};
use medresearch::config::AssistConfig;
use medresearch::error::ErrorKind;
use medresearch::research::Accuracy;

const API_KEY: &str = "test-gemini-key";
const MODEL: &str = "gemini-2.0-flash";

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(String, String, Value)>>>,
}

async fn generate(
    State(stub): State<Stub>,
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = query.get("key").cloned().unwrap_or_default();
    stub.seen
        .lock()
        .expect("seen")
        .push((model_action, key, body));
    (stub.status, Json(stub.reply.clone()))
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("failed to bind")
}

async fn start_stub(status: StatusCode, reply: Value) -> Option<(SocketAddr, Stub)> {
    let stub = Stub {
        status,
        reply,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1beta/models/{model_action}", post(generate))
        .with_state(stub.clone());

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => {
            eprintln!("Skipping test: local bind not permitted ({e})");
            return None;
        }
        Err(e) => panic!("Failed to bind Gemini stub: {e}"),
    };
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some((addr, stub))
}

fn client_for(base_url: String) -> AssistClient {
    let backend = GeminiClient::new(&AssistConfig {
        api_key: SecretString::from(API_KEY.to_string()),
        base_url,
        model: MODEL.to_string(),
    });
    AssistClient::new(Arc::new(backend))
}

fn accuracy() -> Accuracy {
    Accuracy::new(92).expect("valid accuracy")
}

#[tokio::test]
async fn summary_posts_prompt_and_returns_candidate_text() {
    let reply = json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": "A promising result." }] } }]
    });
    let Some((addr, stub)) = start_stub(StatusCode::OK, reply).await else {
        return;
    };
    let client = client_for(format!("http://{addr}"));

    let outcome = client
        .request_summary("Drug Discovery - Phase 1", accuracy(), "0xabc")
        .await;
    assert_eq!(outcome, AssistOutcome::Ready("A promising result.".to_string()));
    assert_eq!(client.snapshot(AssistKind::Summary).status, AssistStatus::Ready);

    let seen = stub.seen.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    let (model_action, key, body) = &seen[0];
    assert_eq!(model_action, &format!("{MODEL}:generateContent"));
    assert_eq!(key, API_KEY);
    assert_eq!(body["contents"][0]["role"], "user");
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .expect("prompt text");
    assert!(prompt.contains("'Drug Discovery - Phase 1'"));
    assert!(prompt.contains("92%"));
}

#[tokio::test]
async fn response_without_candidates_uses_fixed_fallback() {
    let Some((addr, _stub)) = start_stub(StatusCode::OK, json!({ "promptFeedback": {} })).await
    else {
        return;
    };
    let client = client_for(format!("http://{addr}"));

    let outcome = client.request_next_steps("Oncology", accuracy()).await;
    match outcome {
        AssistOutcome::Failed {
            error, fallback, ..
        } => {
            assert_eq!(error, ErrorKind::UnexpectedResponseShape);
            assert_eq!(
                fallback,
                "Failed to suggest next steps. Unexpected API response."
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let snapshot = client.snapshot(AssistKind::NextSteps);
    assert_eq!(snapshot.status, AssistStatus::Failed);
    assert_eq!(
        snapshot.result_text.as_deref(),
        Some("Failed to suggest next steps. Unexpected API response.")
    );
}

#[tokio::test]
async fn error_status_with_error_body_is_an_unexpected_shape() {
    let reply = json!({ "error": { "code": 400, "message": "API key not valid." } });
    let Some((addr, _stub)) = start_stub(StatusCode::BAD_REQUEST, reply).await else {
        return;
    };
    let client = client_for(format!("http://{addr}"));

    let outcome = client
        .request_explanation("tachycardia")
        .await
        .expect("term present");
    assert!(
        matches!(
            outcome,
            AssistOutcome::Failed {
                error: ErrorKind::UnexpectedResponseShape,
                ..
            }
        ),
        "got {outcome:?}"
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_failure_without_the_key() {
    // Bind and drop to get a port nothing listens on.
    let addr = match std::net::TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener.local_addr().expect("local addr"),
        Err(e) if is_bind_permission_error(&e) => return,
        Err(e) => panic!("Failed to bind: {e}"),
    };
    let client = client_for(format!("http://{addr}"));

    let outcome = client
        .request_explanation("angina")
        .await
        .expect("term present");
    match outcome {
        AssistOutcome::Failed {
            error,
            fallback,
            reason,
        } => {
            assert_eq!(error, ErrorKind::NetworkFailure);
            assert_eq!(
                fallback,
                "Failed to explain term due to a network error or API issue."
            );
            assert!(!reason.contains(API_KEY));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_term_sends_nothing() {
    let Some((addr, stub)) = start_stub(StatusCode::OK, json!({})).await else {
        return;
    };
    let client = client_for(format!("http://{addr}"));

    let err = client.request_explanation("   ").await.expect_err("blank");
    assert_eq!(err.kind(), ErrorKind::MissingField);
    assert!(stub.seen.lock().expect("seen").is_empty());
    assert_eq!(
        client.snapshot(AssistKind::ExplainTerm).status,
        AssistStatus::Idle
    );
}
