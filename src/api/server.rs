use crate::config::ApiConfig;
use crate::error::{AdrsError, Result};
use crate::orchestration::AdrsOrchestrator;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::handlers::{
    analyze_handler, health_handler, live_handler, reset_handler, status_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) orchestrator: Arc<AdrsOrchestrator>,
    pub(crate) max_upload_bytes: u64,
}

/// HTTP surface driving the accident-response workflow.
///
/// Thin glue only: handlers validate uploads, translate workflow errors to
/// status codes, and expose session snapshots. All workflow logic lives in
/// the orchestrator.
pub struct ApiServer {
    config: ApiConfig,
    state: ServerState,
}

impl ApiServer {
    pub fn new(
        config: ApiConfig,
        orchestrator: Arc<AdrsOrchestrator>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            config,
            state: ServerState {
                orchestrator,
                max_upload_bytes,
            },
        }
    }

    /// Bind and serve until the process shuts down
    pub async fn start(&self) -> Result<()> {
        // Browsers upload directly to this surface, so it is CORS-open
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/analyze", post(analyze_handler))
            .route("/reset", post(reset_handler))
            .route("/status", get(status_handler))
            .route("/live", get(live_handler))
            .route("/health", get(health_handler))
            .layer(DefaultBodyLimit::max(
                self.state.max_upload_bytes as usize + 1024 * 1024,
            ))
            .layer(cors)
            .with_state(self.state.clone());

        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting ADRS API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AdrsError::system(format!("Failed to bind {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| AdrsError::system(format!("Server error: {}", e)))?;

        Ok(())
    }
}
