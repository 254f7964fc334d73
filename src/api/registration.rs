//! ZeroTier registration endpoint
//!
//! A HoloPort posts its identity here during onboarding. The ZeroTier address
//! becomes the member, the holochain agent id becomes its name, and the admin
//! email is kept as its description.

use std::sync::Arc;

use axum::{body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, invalid_payload, relay_error};
use crate::transport::OutboundResponse;
use crate::zerotier::RegistrationRequest;

/// Registration request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationPayload {
    pub data: DeviceRegistration,
}

/// Identity of the device being onboarded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRegistration {
    /// Admin email from the device config
    pub email: String,
    /// Base36 holochain agent id
    pub holochain_agent_id: String,
    /// 10-digit ZeroTier node address
    pub zerotier_address: String,
    /// Public URL of the HoloPort; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holoport_url: Option<String>,
}

impl DeviceRegistration {
    /// Reject identities that would address the wrong ZeroTier endpoint
    fn validate(&self) -> Result<(), &'static str> {
        if !is_node_address(&self.zerotier_address) {
            return Err("zerotier_address must be 10 hex digits");
        }
        if self.holochain_agent_id.trim().is_empty() {
            return Err("holochain_agent_id must not be empty");
        }
        Ok(())
    }

    /// The membership this device asks for
    #[must_use]
    pub fn to_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            address: self.zerotier_address.clone(),
            name: self.holochain_agent_id.clone(),
            description: self.email.clone(),
        }
    }
}

/// ZeroTier node addresses are 40 bits written as 10 hex digits
fn is_node_address(address: &str) -> bool {
    address.len() == 10 && address.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Handle a registration: clean up stale members and authorize the device
///
/// Relays ZeroTier's answer to the authorization call as-is.
pub async fn handle_registration(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<OutboundResponse, ApiError> {
    let payload: RegistrationPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed registration payload");
        invalid_payload(&e.to_string())
    })?;

    let device = payload.data;
    device.validate().map_err(|reason| {
        tracing::warn!(reason, "rejecting registration payload");
        invalid_payload(reason)
    })?;

    tracing::info!(
        agent_id = %device.holochain_agent_id,
        zerotier_address = %device.zerotier_address,
        holoport_url = ?device.holoport_url,
        "registration received"
    );

    let registration = state
        .registrar
        .register(&device.to_request())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "registration failed");
            relay_error(&e)
        })?;

    tracing::info!(
        status = %registration.response.status,
        stale = registration.cleanup.matched.len(),
        cleaned = registration.cleanup.cleaned(),
        listing_error = ?registration.cleanup.listing_error,
        "registration relayed"
    );

    Ok(registration.response)
}
