use crate::error::{AdrsError, WorkflowError};
use crate::media::MediaAsset;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, info};

use super::server::ServerState;

/// Accept a media upload and start an analysis session.
///
/// Validation failures are rejected synchronously with 422 before any
/// collaborator is contacted; a busy workflow yields 409 with no queueing.
pub async fn analyze_handler(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "missing file field"),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let file_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let data = match field.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    debug!(
        "Received upload {} ({} bytes, {})",
        file_name,
        data.len(),
        content_type
    );

    let asset = match MediaAsset::from_upload_with_limit(
        file_name,
        content_type,
        data,
        state.max_upload_bytes,
    ) {
        Ok(asset) => asset,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
    };

    info!(
        "Starting analysis for {} ({})",
        asset.file_name,
        asset.kind.as_str()
    );

    match state.orchestrator.start(asset).await {
        Ok(epoch) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "success": true,
                "epoch": epoch,
            })),
        ),
        Err(AdrsError::Workflow(WorkflowError::Busy { state })) => error_response(
            StatusCode::CONFLICT,
            &format!("analysis already running (state: {})", state),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Force the workflow back to Idle, cancelling any outstanding work
pub async fn reset_handler(State(state): State<ServerState>) -> impl IntoResponse {
    state.orchestrator.reset().await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "session reset",
        })),
    )
}

/// Current workflow snapshot
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.snapshot().await;
    (StatusCode::OK, Json(snapshot))
}

/// Current live preview session
pub async fn live_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let query = state.orchestrator.preview_manager().query_session();
    (StatusCode::OK, Json(query))
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let components = state.orchestrator.get_all_component_states().await;
    let components: serde_json::Map<String, serde_json::Value> = components
        .into_iter()
        .map(|(name, component_state)| {
            (name, serde_json::json!(format!("{:?}", component_state)))
        })
        .collect();

    let health_info = serde_json::json!({
        "status": "healthy",
        "session_state": state.orchestrator.current_state().name(),
        "components": components,
        "server_info": {
            "subscribers": state.orchestrator.event_bus().subscriber_count(),
        }
    });

    (StatusCode::OK, Json(health_info))
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "message": message,
        })),
    )
}
