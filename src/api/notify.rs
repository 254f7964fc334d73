//! Failed-registration notification endpoint

use std::sync::Arc;

use axum::{body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, invalid_payload, relay_error};
use crate::transport::OutboundResponse;

/// Notification request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Recipient address
    pub email: String,
    /// Error description passed to the template
    pub error: String,
}

/// Email the owner that registration failed; relays Postmark's answer as-is
pub async fn handle_notify(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<OutboundResponse, ApiError> {
    let payload: NotifyPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed notify payload");
        invalid_payload(&e.to_string())
    })?;

    state
        .postmark
        .notify_failure(&payload.email, &payload.error)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "notification failed");
            relay_error(&e)
        })
}
