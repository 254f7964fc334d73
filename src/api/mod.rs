//! HTTP API server for the holo-auth relay

pub mod health;
pub mod notify;
pub mod registration;

use std::sync::Arc;

use axum::{Json, Router, http::StatusCode, routing::post};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::postmark::PostmarkClient;
use crate::settings::Settings;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::zerotier::{MemberRegistrar, ZeroTierClient};
use crate::{Error, Result};

/// Shared state for API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    pub registrar: MemberRegistrar,
    pub postmark: PostmarkClient,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

fn error_response(code: &str, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        },
    })
}

/// Handler-boundary error
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Error code the relay answers malformed requests with
pub const INVALID_PAYLOAD: &str = "invalid_payload";

/// Malformed inbound request; always answered with 401
fn invalid_payload(message: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        error_response(INVALID_PAYLOAD, message),
    )
}

/// Map a relay failure to the status the caller sees
fn relay_error(e: &Error) -> ApiError {
    match e {
        Error::Provider { status, .. } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            error_response("provider_error", &e.to_string()),
        ),
        Error::Http(_) | Error::Transport(_) | Error::Serialization(_) => (
            StatusCode::BAD_GATEWAY,
            error_response("upstream_unreachable", &e.to_string()),
        ),
        Error::SettingNotFound(_) | Error::Config(_) | Error::Io(_) | Error::Toml(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_response("misconfigured", &e.to_string()),
        ),
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/zt_registration", post(registration::handle_registration))
        .route("/v1/notify", post(notify::handle_notify))
        .with_state(state)
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    port: u16,
    zerotier_api_url: String,
    cleanup: crate::zerotier::CleanupPolicy,
    postmark: crate::config::PostmarkConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    settings: Arc<dyn Settings>,
}

impl ApiServerBuilder {
    /// Create a builder from loaded configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.server.port,
            zerotier_api_url: config.zerotier.api_url.clone(),
            cleanup: config.zerotier.cleanup,
            postmark: config.postmark.clone(),
            transport: None,
            settings: Arc::new(config.settings_store()),
        }
    }

    /// Override the port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use a specific outbound transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a specific settings store
    #[must_use]
    pub fn settings(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = settings;
        self
    }

    /// Build the shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        let transport = self
            .transport
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

        let zerotier = ZeroTierClient::new(
            transport.clone(),
            self.settings.clone(),
            &self.zerotier_api_url,
        );

        let postmark = PostmarkClient::new(transport, self.settings.clone(), &self.postmark.api_url)
            .sender(&self.postmark.sender)
            .template_alias(&self.postmark.template_alias)
            .internal_domain(&self.postmark.internal_domain);

        Arc::new(ApiState {
            registrar: MemberRegistrar::new(zerotier, self.cleanup),
            postmark,
        })
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: self.state(),
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Router for this server
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            cleanup = %self.state.registrar.policy(),
            "API server listening"
        );

        Self::serve(listener, self.router()).await
    }

    /// Serve `router` on an already-bound listener until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the server fails
    pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Resolve on ctrl-c
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
