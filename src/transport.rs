//! Outbound HTTP capability
//!
//! Provider clients never talk to reqwest directly; they hand an
//! [`OutboundRequest`] to an [`HttpTransport`] so tests can substitute a fake.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// A request to a third-party API
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Extra headers, in order
    pub headers: Vec<(String, String)>,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
}

impl OutboundRequest {
    /// Create a request with no headers and no body
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET` request
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST` request
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// `DELETE` request
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an `authorization: Bearer` header
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    /// Attach a JSON body
    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header value by case-insensitive name
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A provider's answer, kept verbatim so it can be relayed
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// Status code
    pub status: StatusCode,
    /// `content-type` header, if the provider sent one
    pub content_type: Option<String>,
    /// Raw body
    pub body: Vec<u8>,
}

impl OutboundResponse {
    /// Build a JSON response (used by fake transports)
    #[must_use]
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string().into_bytes(),
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as lossy UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-success status into `Error::Provider`
    ///
    /// # Errors
    ///
    /// Returns `Error::Provider` carrying the status and body text
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Provider {
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }
}

impl IntoResponse for OutboundResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// Capability to perform outbound HTTP calls
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and return the provider's answer
    ///
    /// A non-success status is a valid answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when no answer was received
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse>;
}

/// Production transport backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing client
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse> {
        let mut req = self.client.request(request.method, &request.url);

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let response = req.send().await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| Error::Transport(format!("invalid status from provider: {e}")))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(OutboundResponse {
            status,
            content_type,
            body,
        })
    }
}
