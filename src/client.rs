//! Device-side registration client
//!
//! Runs on the HoloPort: posts its identity to the relay and keeps retrying
//! with a doubling delay until the relay accepts it.

use std::time::Duration;

use reqwest::Client;

use crate::api::INVALID_PAYLOAD;
use crate::api::registration::{DeviceRegistration, RegistrationPayload};
use crate::{Error, Result};

/// Retry schedule: delays double from `initial`, capped at `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// First delay
    pub initial: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl Backoff {
    /// Delays to sleep between attempts
    #[must_use]
    pub fn delays(&self) -> Delays {
        Delays {
            next: self.initial,
            max_delay: self.max_delay,
            remaining: self.max_attempts.map(|n| n.saturating_sub(1)),
        }
    }
}

/// Iterator over backoff delays
#[derive(Debug, Clone)]
pub struct Delays {
    next: Duration,
    max_delay: Duration,
    remaining: Option<u32>,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        let delay = self.next.min(self.max_delay);
        self.next = self.next.saturating_add(self.next);
        Some(delay)
    }
}

/// Client for the relay's registration endpoint
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    client: Client,
    server_url: String,
}

impl RegistrationClient {
    /// Create a client for the relay at `server_url`
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Post one registration attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the relay answers non-success
    pub async fn register(&self, device: &DeviceRegistration) -> Result<()> {
        let url = format!("{}/v1/zt_registration", self.server_url);
        let payload = RegistrationPayload {
            data: device.clone(),
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider { status, body });
        }

        tracing::info!(
            zerotier_address = %device.zerotier_address,
            status = %response.status(),
            "registration accepted"
        );
        Ok(())
    }

    /// Register, retrying failed attempts per `backoff`
    ///
    /// A 401 carrying the relay's `invalid_payload` code means the payload
    /// itself was refused and is returned without retrying.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the payload rejection
    pub async fn register_with_backoff(
        &self,
        device: &DeviceRegistration,
        backoff: Backoff,
    ) -> Result<()> {
        let mut delays = backoff.delays();
        let mut attempt = 1_u32;

        loop {
            let err = match self.register(device).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !is_retryable(&err) {
                tracing::error!(error = %err, "registration rejected");
                return Err(err);
            }

            let Some(delay) = delays.next() else {
                tracing::error!(error = %err, attempts = attempt, "giving up on registration");
                return Err(err);
            };

            tracing::warn!(
                error = %err,
                attempt,
                retry_in = ?delay,
                "registration failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Whether another attempt could succeed
///
/// Only the relay's own payload rejection is final. Any other status,
/// including 4xx answers relayed from ZeroTier, may clear up later.
fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Provider { status, body } => !is_payload_rejection(*status, body),
        _ => true,
    }
}

/// Whether the relay refused the payload itself
fn is_payload_rejection(status: u16, body: &str) -> bool {
    status == 401
        && serde_json::from_str::<serde_json::Value>(body)
            .is_ok_and(|v| v["error"]["code"] == INVALID_PAYLOAD)
}
