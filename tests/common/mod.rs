//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use holo_auth::config::file::AuthConfigFile;
use holo_auth::settings::{POSTMARK_SERVER_TOKEN, ZEROTIER_API_TOKEN, ZEROTIER_NETWORK_ID};
use holo_auth::{
    ApiServerBuilder, ApiState, CleanupPolicy, Config, HttpTransport, MemorySettings,
    OutboundRequest, OutboundResponse, Settings,
};
use reqwest::Method;
use serde_json::{Value, json};

pub const ZT_API: &str = "https://zt.test/api";
pub const PM_API: &str = "https://pm.test";
pub const NETWORK: &str = "8056c2e21c000001";
pub const ZT_TOKEN: &str = "zt-token";
pub const PM_TOKEN: &str = "pm-token";

/// URL of the member listing
pub fn members_url() -> String {
    format!("{ZT_API}/network/{NETWORK}/member")
}

/// URL of a single member
pub fn member_url(node_id: &str) -> String {
    format!("{ZT_API}/network/{NETWORK}/member/{node_id}")
}

/// URL of the Postmark templated send
pub fn postmark_url() -> String {
    format!("{PM_API}/email/withTemplate")
}

/// Settings holding every key the relay needs
pub fn full_settings() -> MemorySettings {
    MemorySettings::new()
        .with(ZEROTIER_API_TOKEN, ZT_TOKEN)
        .with(ZEROTIER_NETWORK_ID, NETWORK)
        .with(POSTMARK_SERVER_TOKEN, PM_TOKEN)
}

/// Member listing JSON as ZeroTier Central returns it
pub fn member_list(members: &[(&str, &str)]) -> Value {
    Value::Array(
        members
            .iter()
            .map(|(node_id, name)| {
                json!({
                    "id": format!("{NETWORK}-{node_id}"),
                    "nodeId": node_id,
                    "name": name,
                    "description": "",
                    "config": { "authorized": true }
                })
            })
            .collect(),
    )
}

/// What the fake answers with
#[derive(Clone)]
pub enum Reply {
    /// Answer with this response
    Respond(OutboundResponse),
    /// Fail as if the connection broke
    Fail(String),
    /// Wait, then answer
    Delayed(Duration, OutboundResponse),
}

impl Reply {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self::Respond(OutboundResponse::json(status, &body))
    }

    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn raw(status: StatusCode, body: &str) -> Self {
        Self::Respond(OutboundResponse {
            status,
            content_type: Some("text/plain".to_string()),
            body: body.as_bytes().to_vec(),
        })
    }
}

/// Something the fake saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(Method, String),
    Finished(Method, String),
}

/// Transport that records requests and answers from a fixed script
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<(Method, String), Reply>,
    requests: Mutex<Vec<OutboundRequest>>,
    events: Mutex<Vec<Event>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answer for `method url`
    pub fn on(mut self, method: Method, url: impl Into<String>, reply: Reply) -> Self {
        self.routes.insert((method, url.into()), reply);
        self
    }

    /// Every request, in the order it was sent
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests matching `method` and `url`
    pub fn requests_to(&self, method: &Method, url: &str) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| &r.method == method && r.url == url)
            .collect()
    }

    /// Start/finish events in order
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: OutboundRequest) -> holo_auth::Result<OutboundResponse> {
        let key = (request.method.clone(), request.url.clone());
        self.requests.lock().unwrap().push(request);
        self.events
            .lock()
            .unwrap()
            .push(Event::Started(key.0.clone(), key.1.clone()));

        let reply = self
            .routes
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Reply::ok(json!({})));

        let result = match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(reason) => Err(holo_auth::Error::Transport(reason)),
            Reply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
        };

        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(key.0, key.1));
        result
    }
}

/// Config pointing at the fake provider URLs
pub fn test_config(cleanup: CleanupPolicy) -> Config {
    let cleanup = cleanup.to_string();
    Config::from_sources(AuthConfigFile::default(), move |name| match name {
        "HOLO_AUTH_ZEROTIER_API_URL" => Some(ZT_API.to_string()),
        "HOLO_AUTH_POSTMARK_API_URL" => Some(PM_API.to_string()),
        "HOLO_AUTH_ZEROTIER_CLEANUP" => Some(cleanup.clone()),
        _ => None,
    })
    .expect("test config is valid")
}

/// Handler state wired to `transport` and `settings`
pub fn test_state(
    transport: Arc<FakeTransport>,
    settings: impl Settings + 'static,
    cleanup: CleanupPolicy,
) -> Arc<ApiState> {
    ApiServerBuilder::new(&test_config(cleanup))
        .transport(transport)
        .settings(Arc::new(settings))
        .state()
}
