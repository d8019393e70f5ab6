//! Tally Web Server
//!
//! Axum-based REST API over the tally statement analyzer.
//!
//! - Statement import (CSV or extracted text) and summaries
//! - Categorization and savings analysis through the completion dispatcher
//! - Restrictive CORS policy and sanitized error responses

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::{Error as CoreError, StatementAnalyzer};

mod handlers;

/// Maximum request body size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub analyzer: StatementAnalyzer,
}

/// Create the router with all API routes
pub fn create_router(analyzer: StatementAnalyzer, config: ServerConfig) -> Router {
    let state = AppState { analyzer };

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/statements/parse", post(handlers::parse_statement))
        .route("/statements/summary", post(handlers::summarize_statement))
        .route("/categorize", post(handlers::categorize))
        .route("/analyze", post(handlers::analyze));

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .fallback(|| async { AppError::not_found("Not found") })
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(
    analyzer: StatementAnalyzer,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    log_providers(&analyzer);

    let app = create_router(analyzer, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn log_providers(analyzer: &StatementAnalyzer) {
    let dispatcher = analyzer.dispatcher();
    let primary = dispatcher.primary();
    info!(
        provider = primary.name(),
        host = primary.host(),
        default_model = %dispatcher.registry().default_model().id,
        "Primary provider"
    );
    match dispatcher.secondary() {
        Some(secondary) => info!(
            provider = secondary.name(),
            host = secondary.host(),
            "Secondary provider"
        ),
        None => warn!("No secondary provider configured, fallback limited to substitutes"),
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_gateway(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn service_unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error onto a status code
    ///
    /// Bad input is a 400, an unparseable model reply a 502, an exhausted
    /// fallback chain a 503. Everything else is an opaque 500.
    pub fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::InvalidData(_) | CoreError::Import(_) | CoreError::Csv(_) => {
                Self::bad_request(&err.to_string())
            }
            CoreError::MalformedResponse(_) => Self::bad_gateway(&err.to_string()),
            CoreError::ProviderUnavailable(_)
            | CoreError::Transport(_)
            | CoreError::Provider { .. } => Self::service_unavailable(&err.to_string()),
            other => Self::from(anyhow::Error::new(other)),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        } else if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
