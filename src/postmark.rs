//! Postmark templated email integration
//!
//! Sends the failed-registration notice to a HoloPort owner. Recipients on the
//! internal domain are tagged separately so Postmark stats can tell staff test
//! devices apart from customer devices.

use std::fmt;
use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::{self, Settings};
use crate::transport::{HttpTransport, OutboundRequest, OutboundResponse};
use crate::Result;

/// Default Postmark API base URL
pub const DEFAULT_API_URL: &str = "https://api.postmarkapp.com";

/// Default sender for notification emails
pub const DEFAULT_SENDER: &str = "Holo <no-reply@holo.host>";

/// Template used for failed registrations
pub const DEFAULT_TEMPLATE_ALIAS: &str = "failed-registration";

/// Recipients on this domain count as internal
pub const DEFAULT_INTERNAL_DOMAIN: &str = "holo.host";

/// Which side of the house a recipient belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Address on the internal domain
    Internal,
    /// Everyone else
    External,
}

impl Audience {
    /// Classify `email` against `internal_domain` (without the `@`)
    #[must_use]
    pub fn classify(email: &str, internal_domain: &str) -> Self {
        let suffix = format!("@{}", internal_domain.trim_start_matches('@'));
        if email.ends_with(&suffix) {
            Self::Internal
        } else {
            Self::External
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("Internal"),
            Self::External => f.write_str("External"),
        }
    }
}

/// Data passed to the failed-registration template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureModel {
    /// Error description shown to the recipient
    pub error: String,
}

/// Body of `POST /email/withTemplate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TemplatedEmail {
    /// Sender, e.g. `Holo <no-reply@holo.host>`
    pub from: String,
    /// Stats tag: `"<Audience> <template alias>"`
    pub tag: String,
    /// Recipient address
    pub to: String,
    /// Template alias
    pub template_alias: String,
    /// Template data
    pub template_model: FailureModel,
}

/// Postmark's reply to an accepted send
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    /// Postmark message id
    #[serde(rename = "MessageID")]
    pub message_id: Uuid,
}

/// Client for the Postmark email API
#[derive(Clone)]
pub struct PostmarkClient {
    transport: Arc<dyn HttpTransport>,
    settings: Arc<dyn Settings>,
    api_url: String,
    sender: String,
    template_alias: String,
    internal_domain: String,
}

impl PostmarkClient {
    /// Create a client with the default sender, template and internal domain
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
            sender: DEFAULT_SENDER.to_string(),
            template_alias: DEFAULT_TEMPLATE_ALIAS.to_string(),
            internal_domain: DEFAULT_INTERNAL_DOMAIN.to_string(),
        }
    }

    /// Override the sender
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Override the template alias
    #[must_use]
    pub fn template_alias(mut self, alias: impl Into<String>) -> Self {
        self.template_alias = alias.into();
        self
    }

    /// Override the internal domain
    #[must_use]
    pub fn internal_domain(mut self, domain: impl Into<String>) -> Self {
        self.internal_domain = domain.into();
        self
    }

    /// Build the email for a failed registration
    #[must_use]
    pub fn failure_email(&self, email: &str, error: &str) -> TemplatedEmail {
        let audience = Audience::classify(email, &self.internal_domain);

        TemplatedEmail {
            from: self.sender.clone(),
            tag: format!("{audience} {}", self.template_alias),
            to: email.to_string(),
            template_alias: self.template_alias.clone(),
            template_model: FailureModel {
                error: error.to_string(),
            },
        }
    }

    /// Send the failed-registration notice to `email`
    ///
    /// # Errors
    ///
    /// Returns an error if the server token is missing or no answer was received
    pub async fn notify_failure(&self, email: &str, error: &str) -> Result<OutboundResponse> {
        let token = self.settings.get(settings::POSTMARK_SERVER_TOKEN).await?;
        let payload = self.failure_email(email, error);

        tracing::info!(to = %payload.to, tag = %payload.tag, "sending templated email");

        let request = OutboundRequest::post(format!("{}/email/withTemplate", self.api_url))
            .header("accept", "application/json")
            .header("x-postmark-server-token", token.expose_secret())
            .json(serde_json::to_value(&payload)?);

        let response = self.transport.send(request).await?;

        if response.is_success() {
            match response.decode::<SendReceipt>() {
                Ok(receipt) => tracing::info!(message_id = %receipt.message_id, "email accepted"),
                Err(e) => tracing::debug!(error = %e, "email accepted without a readable receipt"),
            }
        } else {
            tracing::warn!(
                status = %response.status,
                body = %response.text(),
                "Postmark rejected email"
            );
        }

        Ok(response)
    }
}

impl fmt::Debug for PostmarkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostmarkClient")
            .field("api_url", &self.api_url)
            .field("sender", &self.sender)
            .field("template_alias", &self.template_alias)
            .field("internal_domain", &self.internal_domain)
            .finish_non_exhaustive()
    }
}
