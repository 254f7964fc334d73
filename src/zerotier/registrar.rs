//! Replace stale registrations before authorizing a new member
//!
//! A HoloPort that re-runs onboarding gets a fresh ZeroTier address but keeps
//! its holochain agent id, which is used as the member name. Older members
//! carrying the same name are cleaned up first so at most one of them stays
//! authorized. Cleanup is best-effort: nothing that goes wrong before the
//! final authorization call stops that call from being made.

use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::{Credentials, Member, ZeroTierClient};
use crate::transport::OutboundResponse;
use crate::{Error, Result};

/// How stale members are cleaned up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// `POST config.authorized=false`; reversible, record stays listed
    #[default]
    Deauthorize,
    /// `DELETE` the member record
    Delete,
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deauthorize => f.write_str("deauthorize"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

impl FromStr for CleanupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deauthorize" => Ok(Self::Deauthorize),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Config(format!(
                "unknown cleanup policy '{other}' (expected 'deauthorize' or 'delete')"
            ))),
        }
    }
}

/// A request to put one device on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// ZeroTier node address of the new member
    pub address: String,
    /// Member name; stale members sharing it are cleaned up
    pub name: String,
    /// Free text stored on the member
    pub description: String,
}

/// A cleanup call that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Member the call targeted
    pub node_id: String,
    /// What went wrong
    pub error: String,
}

/// Diagnostics from the cleanup phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of members in the listing (0 if listing failed)
    pub listed: usize,
    /// Node ids that matched the name, in listing order
    pub matched: Vec<String>,
    /// Cleanup calls that failed
    pub failures: Vec<CleanupFailure>,
    /// Why the listing could not be used, if it could not
    pub listing_error: Option<String>,
}

impl CleanupReport {
    /// Whether every step of cleanup went through
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.listing_error.is_none()
    }

    /// Number of matched members that were cleaned up
    #[must_use]
    pub fn cleaned(&self) -> usize {
        self.matched.len().saturating_sub(self.failures.len())
    }
}

/// Outcome of a registration: the provider's answer plus cleanup diagnostics
#[derive(Debug, Clone)]
pub struct Registration {
    /// Answer to the authorization call, unmodified
    pub response: OutboundResponse,
    /// What happened to stale members
    pub cleanup: CleanupReport,
}

/// Members whose name equals `name` exactly
pub(crate) fn stale_members<'a>(members: &'a [Member], name: &str) -> Vec<&'a Member> {
    members
        .iter()
        .filter(|m| m.name.as_deref() == Some(name))
        .collect()
}

/// Cleans up stale members and authorizes new ones
#[derive(Debug, Clone)]
pub struct MemberRegistrar {
    client: ZeroTierClient,
    policy: CleanupPolicy,
}

impl MemberRegistrar {
    /// Create a registrar using `policy` for stale members
    #[must_use]
    pub const fn new(client: ZeroTierClient, policy: CleanupPolicy) -> Self {
        Self { client, policy }
    }

    /// Cleanup policy in use
    #[must_use]
    pub const fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    /// Clean up members named `request.name`, then authorize `request.address`
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be resolved or the authorization
    /// call gets no answer. Cleanup problems are reported in the returned
    /// [`CleanupReport`], never as an error.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<Registration> {
        let creds = self.client.credentials().await?;

        let cleanup = self.clear_stale(&creds, &request.name).await;

        tracing::info!(
            address = %request.address,
            name = %request.name,
            network_id = %creds.network_id(),
            "authorizing member"
        );

        let response = self
            .client
            .authorize_member(&creds, &request.address, &request.name, &request.description)
            .await?;

        if response.is_success() {
            tracing::info!(
                address = %request.address,
                status = %response.status,
                "member authorized"
            );
        } else {
            tracing::warn!(
                address = %request.address,
                status = %response.status,
                body = %response.text(),
                "authorization rejected by ZeroTier"
            );
        }

        Ok(Registration { response, cleanup })
    }

    /// Fan out one cleanup call per stale member and wait for all of them
    async fn clear_stale(&self, creds: &Credentials, name: &str) -> CleanupReport {
        tracing::info!(
            name = %name,
            network_id = %creds.network_id(),
            "fetching members to clear stale entries"
        );

        let members = match self.client.list_members(creds).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list members, skipping cleanup");
                return CleanupReport {
                    listing_error: Some(e.to_string()),
                    ..CleanupReport::default()
                };
            }
        };

        let stale = stale_members(&members, name);
        let matched: Vec<String> = stale.iter().map(|m| m.node_id.clone()).collect();

        tracing::info!(
            total = members.len(),
            stale = ?matched,
            policy = %self.policy,
            "found stale members"
        );

        let results = join_all(stale.iter().map(|m| self.clean_up(creds, &m.node_id))).await;

        let failures: Vec<CleanupFailure> = results
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();

        if failures.is_empty() {
            tracing::info!(cleaned = matched.len(), "clean up completed");
        } else {
            tracing::warn!(
                failed = failures.len(),
                matched = matched.len(),
                "clean up completed with failures"
            );
        }

        CleanupReport {
            listed: members.len(),
            matched,
            failures,
            listing_error: None,
        }
    }

    /// Clean up one member, capturing any failure
    async fn clean_up(
        &self,
        creds: &Credentials,
        node_id: &str,
    ) -> std::result::Result<(), CleanupFailure> {
        tracing::debug!(node_id = %node_id, policy = %self.policy, "cleaning up member");

        let result = match self.policy {
            CleanupPolicy::Deauthorize => self.client.deauthorize_member(creds, node_id).await,
            CleanupPolicy::Delete => self.client.delete_member(creds, node_id).await,
        }
        .and_then(OutboundResponse::error_for_status);

        match result {
            Ok(response) => {
                tracing::info!(
                    node_id = %node_id,
                    status = %response.status,
                    "stale member cleaned up"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "unable to clean up stale member");
                Err(CleanupFailure {
                    node_id: node_id.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }
}
