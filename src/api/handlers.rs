//! HTTP request handlers

use super::types::{
    AcceptedResponse, ClientStateResponse, ErrorListResponse, ErrorResponse, MessageRequest,
};
use super::AppState;
use crate::runtime::{ProcessOutcome, Transport};
use crate::snapshots::{ErrorId, ErrorSnapshot, SnapshotQuery};
use crate::state_machine::ClientId;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Messaging gateway delivery; replies go out through the transport
        .route("/webhook", post(receive_webhook))
        // Synchronous processing for tools and tests
        .route("/api/messages", post(process_message))
        // Error snapshots
        .route("/api/errors", get(list_errors))
        .route("/api/errors/:id", get(get_error))
        .route("/api/clients/:id/state", get(get_client_state))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Inbound Messages
// ============================================================

async fn receive_webhook(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    let (client, mut event) = req.into_event().map_err(AppError::BadRequest)?;
    let delivery_id = event.delivery_id_or_assign();
    event.delivery_id = Some(delivery_id.clone());

    tokio::spawn(async move {
        let outcome = state.engine.process_message(&client, event).await;
        if outcome.messages.is_empty() {
            return;
        }
        if let Err(e) = state.transport.deliver(&client, &outcome.messages).await {
            tracing::error!(client_id = %client, error = %e, "Failed to deliver replies");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            delivery_id,
        }),
    ))
}

async fn process_message(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ProcessOutcome>, AppError> {
    let (client, event) = req.into_event().map_err(AppError::BadRequest)?;
    Ok(Json(state.engine.process_message(&client, event).await))
}

// ============================================================
// Diagnostics
// ============================================================

async fn get_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ErrorSnapshot>, AppError> {
    let error_id = ErrorId::parse(&id)
        .ok_or_else(|| AppError::BadRequest(format!("Malformed error id: {id}")))?;
    state
        .engine
        .get_error_snapshot(&error_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No snapshot for {error_id}")))
}

async fn list_errors(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ErrorListResponse>, AppError> {
    let errors = state
        .engine
        .list_recent_errors(&query)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(ErrorListResponse {
        count: errors.len(),
        errors,
    }))
}

async fn get_client_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClientStateResponse>, AppError> {
    let client_id = ClientId::new(id);
    let current = state
        .engine
        .current_state(&client_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(ClientStateResponse {
        client_id,
        state: current,
    }))
}

async fn get_version() -> &'static str {
    concat!("postflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
