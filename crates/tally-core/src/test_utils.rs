//! Test utilities for tally-core
//!
//! This module provides a mock OpenAI-compatible provider server that can be
//! used for development and integration tests over real HTTP.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// A request received by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub app_name: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
enum Reply {
    Content(String),
    Status(u16, String),
}

#[derive(Clone)]
struct ServerState {
    reply: Reply,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Mock provider server for testing and development
///
/// Serves `POST /chat/completions` and `GET /models` on an ephemeral port.
pub struct MockProviderServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockProviderServer {
    /// Start a server whose completions always carry `content`
    pub async fn start(content: &str) -> Self {
        Self::spawn(Reply::Content(content.to_string())).await
    }

    /// Start a server that answers every request with `status` and `body`
    pub async fn failing(status: u16, body: &str) -> Self {
        Self::spawn(Reply::Status(status, body.to_string())).await
    }

    async fn spawn(reply: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            reply,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/chat/completions", post(handle_chat))
            .route("/models", get(handle_models))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            requests,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Completion requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn error_response(status: u16, body: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, body.to_string()).into_response()
}

/// OpenAI-compatible chat completions endpoint
async fn handle_chat(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let model = body["model"].as_str().unwrap_or("unknown").to_string();

    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: header(&headers, "authorization"),
        app_name: header(&headers, "x-app-name"),
        body,
    });

    match state.reply {
        Reply::Content(ref content) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Reply::Status(status, ref body) => error_response(status, body),
    }
}

/// OpenAI-compatible model listing endpoint
async fn handle_models(State(state): State<ServerState>) -> Response {
    match state.reply {
        Reply::Content(_) => Json(json!({
            "object": "list",
            "data": [{"id": "mock-model", "object": "model"}]
        }))
        .into_response(),
        Reply::Status(status, ref body) => error_response(status, body),
    }
}
