//! HTTP analysis gateway integration tests
//!
//! Each test runs a local axum server standing in for the remote classifier.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chatguard_monitor::analysis::AnalysisGateway;
use chatguard_monitor::conversation::ConversationLog;
use chatguard_monitor::error::ClassifierErrorKind;
use chatguard_monitor::window::{extract_window, AnalysisWindow};
use chatguard_monitor::{HttpAnalysisGateway, Sentiment};
use serde_json::{json, Value};

/// Serve `router` on an ephemeral port and return its base URL
async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn window_of(lines: &[(&str, &str)], size: usize) -> AnalysisWindow {
    let mut log = ConversationLog::new();
    for (sender, text) in lines {
        log.append(sender, text).unwrap();
    }
    extract_window(log.messages(), size)
}

fn gateway(base_url: &str, timeout: Duration) -> HttpAnalysisGateway {
    HttpAnalysisGateway::new(base_url, timeout).unwrap()
}

// ============================================================================
// Successful verdicts
// ============================================================================

#[tokio::test]
async fn test_valid_verdict_is_parsed() {
    let captured: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    async fn analyze(
        State(captured): State<Arc<Mutex<Vec<Value>>>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        captured.lock().unwrap().push(body);
        Json(json!({
            "sentiment": "NEGATIVE",
            "alert_needed": true,
            "explanation": "threatening language"
        }))
    }

    let router = Router::new()
        .route("/analyze_chats", post(analyze))
        .with_state(Arc::clone(&captured));
    let base_url = spawn_stub(router).await;

    // Given: a four-message conversation and a window of three
    let window = window_of(
        &[
            ("Alice", "hi"),
            ("Bob", "hey"),
            ("Alice", "how are you"),
            ("Bob", "go away"),
        ],
        3,
    );

    // When: the window is submitted
    let result = gateway(&base_url, Duration::from_secs(5))
        .submit("Bob", &window)
        .await
        .unwrap();

    // Then: the verdict is returned and the request carried the window in order
    assert_eq!(result.sentiment, Sentiment::Negative);
    assert!(result.alert_needed);
    assert_eq!(result.explanation, "threatening language");

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["username"], "Bob");
    let chats = requests[0]["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 3);
    assert_eq!(chats[0], json!({"sender": "Bob", "message": "hey"}));
    assert_eq!(chats[2], json!({"sender": "Bob", "message": "go away"}));
}

#[tokio::test]
async fn test_trailing_slash_in_server_url() {
    let router = Router::new().route(
        "/analyze_chats",
        post(|| async {
            Json(json!({
                "sentiment": "POSITIVE",
                "alert_needed": false,
                "explanation": "friendly"
            }))
        }),
    );
    let base_url = spawn_stub(router).await;

    let result = gateway(&format!("{}/", base_url), Duration::from_secs(5))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap();
    assert_eq!(result.sentiment, Sentiment::Positive);
}

// ============================================================================
// Failure mapping
// ============================================================================

#[tokio::test]
async fn test_malformed_body_is_malformed_response() {
    let router = Router::new().route("/analyze_chats", post(|| async { "not json at all" }));
    let base_url = spawn_stub(router).await;

    let err = gateway(&base_url, Duration::from_secs(5))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ClassifierErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_missing_field_is_malformed_response() {
    let router = Router::new().route(
        "/analyze_chats",
        post(|| async { Json(json!({"sentiment": "NEGATIVE", "explanation": "x"})) }),
    );
    let base_url = spawn_stub(router).await;

    let err = gateway(&base_url, Duration::from_secs(5))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ClassifierErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_unknown_sentiment_is_malformed_response() {
    let router = Router::new().route(
        "/analyze_chats",
        post(|| async {
            Json(json!({"sentiment": "ANGRY", "alert_needed": true, "explanation": "x"}))
        }),
    );
    let base_url = spawn_stub(router).await;

    let err = gateway(&base_url, Duration::from_secs(5))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ClassifierErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_server_error_is_upstream_rejected() {
    let router = Router::new().route(
        "/analyze_chats",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model offline") }),
    );
    let base_url = spawn_stub(router).await;

    let err = gateway(&base_url, Duration::from_secs(5))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();

    match err {
        chatguard_monitor::ClassifierError::UpstreamRejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model offline");
        }
        other => panic!("expected UpstreamRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let router = Router::new().route(
        "/analyze_chats",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"sentiment": "POSITIVE", "alert_needed": false, "explanation": ""}))
        }),
    );
    let base_url = spawn_stub(router).await;

    let err = gateway(&base_url, Duration::from_millis(200))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ClassifierErrorKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Reserve a port, then release it so nothing is listening there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(&format!("http://{}", addr), Duration::from_secs(2))
        .submit("Alice", &window_of(&[("Alice", "hello")], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ClassifierErrorKind::Network);
}
