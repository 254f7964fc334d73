//! ZeroTier Central integration
//!
//! Client for listing, authorizing, deauthorizing and deleting members of the
//! HoloPort network.

mod registrar;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

pub use registrar::{
    CleanupFailure, CleanupPolicy, CleanupReport, MemberRegistrar, Registration,
    RegistrationRequest,
};

use crate::settings::{self, Settings};
use crate::transport::{HttpTransport, OutboundRequest, OutboundResponse};
use crate::{Error, Result};

/// Default ZeroTier Central API base URL
pub const DEFAULT_API_URL: &str = "https://my.zerotier.com/api";

/// A member record as returned by ZeroTier Central
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// 10-digit node address
    pub node_id: String,
    /// Human-readable label (the holochain agent id for HoloPorts)
    #[serde(default)]
    pub name: Option<String>,
    /// Free text
    #[serde(default)]
    pub description: Option<String>,
    /// Network-level member config
    #[serde(default)]
    pub config: Option<MemberConfig>,
}

impl Member {
    /// Whether the member is currently authorized on the network
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.authorized)
    }
}

/// Member config subset we care about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Whether the member may join the network
    #[serde(default)]
    pub authorized: bool,
}

/// Token and network resolved from settings for one invocation
pub struct Credentials {
    token: SecretString,
    network_id: String,
}

impl Credentials {
    /// Create credentials directly
    #[must_use]
    pub fn new(token: SecretString, network_id: impl Into<String>) -> Self {
        Self {
            token,
            network_id: network_id.into(),
        }
    }

    /// Network these credentials target
    #[must_use]
    pub fn network_id(&self) -> &str {
        &self.network_id
    }
}

/// Client for the ZeroTier Central API
#[derive(Clone)]
pub struct ZeroTierClient {
    transport: Arc<dyn HttpTransport>,
    settings: Arc<dyn Settings>,
    /// Base URL for the API, without trailing slash
    api_url: String,
}

impl ZeroTierClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `transport` - Outbound HTTP capability
    /// * `settings` - Store holding the API token and network id
    /// * `api_url` - Base URL (e.g., <https://my.zerotier.com/api>)
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        settings: Arc<dyn Settings>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            settings,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve the API token and network id from settings
    ///
    /// # Errors
    ///
    /// Returns `Error::SettingNotFound` if either key is missing
    pub async fn credentials(&self) -> Result<Credentials> {
        let token = self.settings.get(settings::ZEROTIER_API_TOKEN).await?;
        let network_id = self.settings.get(settings::ZEROTIER_NETWORK_ID).await?;
        Ok(Credentials::new(token, network_id.expose_secret()))
    }

    /// API URL with `segments` appended, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Result<String> {
        let invalid = |reason: &str| {
            Error::Config(format!("invalid ZeroTier API URL '{}': {reason}", self.api_url))
        };

        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn members_url(&self, creds: &Credentials) -> Result<String> {
        self.endpoint(&["network", creds.network_id.as_str(), "member"])
    }

    fn member_url(&self, creds: &Credentials, node_id: &str) -> Result<String> {
        self.endpoint(&["network", creds.network_id.as_str(), "member", node_id])
    }

    /// List every member of the network
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the provider answers non-success,
    /// or the body is not a member list
    pub async fn list_members(&self, creds: &Credentials) -> Result<Vec<Member>> {
        let request =
            OutboundRequest::get(self.members_url(creds)?).bearer(creds.token.expose_secret());

        let response = self.transport.send(request).await?.error_for_status()?;
        response.decode()
    }

    /// Soft-remove a member by clearing its authorization; the record stays listed
    ///
    /// # Errors
    ///
    /// Returns an error if no answer was received
    pub async fn deauthorize_member(
        &self,
        creds: &Credentials,
        node_id: &str,
    ) -> Result<OutboundResponse> {
        let request = OutboundRequest::post(self.member_url(creds, node_id)?)
            .bearer(creds.token.expose_secret())
            .json(json!({ "config": { "authorized": false } }));

        self.transport.send(request).await
    }

    /// Hard-remove a member record
    ///
    /// # Errors
    ///
    /// Returns an error if no answer was received
    pub async fn delete_member(
        &self,
        creds: &Credentials,
        node_id: &str,
    ) -> Result<OutboundResponse> {
        let request = OutboundRequest::delete(self.member_url(creds, node_id)?)
            .bearer(creds.token.expose_secret());

        self.transport.send(request).await
    }

    /// Authorize `address` on the network under `name`
    ///
    /// # Errors
    ///
    /// Returns an error if no answer was received
    pub async fn authorize_member(
        &self,
        creds: &Credentials,
        address: &str,
        name: &str,
        description: &str,
    ) -> Result<OutboundResponse> {
        let request = OutboundRequest::post(self.member_url(creds, address)?)
            .bearer(creds.token.expose_secret())
            .json(json!({
                "config": { "authorized": true },
                "description": description,
                "name": name,
            }));

        self.transport.send(request).await
    }
}

impl std::fmt::Debug for ZeroTierClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZeroTierClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}
