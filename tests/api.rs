//! HTTP handler tests
//!
//! Drives the router with `tower::ServiceExt::oneshot` against a fake
//! outbound transport; nothing leaves the process.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use holo_auth::{CleanupPolicy, MemorySettings, api};
use reqwest::Method;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{
    FakeTransport, PM_TOKEN, Reply, full_settings, member_list, member_url, members_url,
    postmark_url, test_state,
};

async fn post_json(router: axum::Router, path: &str, body: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request");

    router.oneshot(req).await.expect("oneshot failed")
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("failed to read body")
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("response body is not valid JSON")
}

fn router_with(transport: &Arc<FakeTransport>) -> axum::Router {
    api::router(test_state(
        transport.clone(),
        full_settings(),
        CleanupPolicy::Deauthorize,
    ))
}

// --- notify ---

#[tokio::test]
async fn notify_tags_internal_recipients() {
    let transport = Arc::new(FakeTransport::new());
    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"user@holo.host","error":"bad-sig"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);

    let sent = transport.requests_to(&Method::POST, &postmark_url());
    assert_eq!(sent.len(), 1);
    let body = sent[0].body.as_ref().unwrap();
    assert_eq!(body["Tag"], "Internal failed-registration");
    assert_eq!(body["To"], "user@holo.host");
    assert_eq!(body["From"], "Holo <no-reply@holo.host>");
    assert_eq!(body["TemplateAlias"], "failed-registration");
    assert_eq!(body["TemplateModel"], json!({ "error": "bad-sig" }));
    assert_eq!(sent[0].header_value("x-postmark-server-token"), Some(PM_TOKEN));
    assert_eq!(sent[0].header_value("accept"), Some("application/json"));
}

#[tokio::test]
async fn notify_tags_external_recipients() {
    let transport = Arc::new(FakeTransport::new());
    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"user@example.com","error":"bad-sig"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);

    let sent = transport.requests_to(&Method::POST, &postmark_url());
    assert_eq!(sent[0].body.as_ref().unwrap()["Tag"], "External failed-registration");
}

#[tokio::test]
async fn notify_relays_postmark_answer() {
    let receipt = json!({
        "To": "user@example.com",
        "SubmittedAt": "2024-01-01T00:00:00Z",
        "MessageID": "b7bc2f4a-e38e-4336-af7d-e6c392c2f817",
        "ErrorCode": 0,
        "Message": "OK"
    });
    let transport = Arc::new(FakeTransport::new().on(
        Method::POST,
        postmark_url(),
        Reply::ok(receipt.clone()),
    ));

    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"user@example.com","error":"bad-sig"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(body_json(resp).await, receipt);
}

#[tokio::test]
async fn notify_relays_postmark_rejection() {
    let rejection = json!({ "ErrorCode": 300, "Message": "Invalid email request" });
    let transport = Arc::new(FakeTransport::new().on(
        Method::POST,
        postmark_url(),
        Reply::json(StatusCode::UNPROCESSABLE_ENTITY, rejection.clone()),
    ));

    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"nobody","error":"bad-sig"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await, rejection);
}

#[tokio::test]
async fn notify_rejects_missing_fields() {
    let transport = Arc::new(FakeTransport::new());
    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"user@example.com"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn notify_without_token_is_server_error() {
    let transport = Arc::new(FakeTransport::new());
    let router = api::router(test_state(
        transport.clone(),
        MemorySettings::new(),
        CleanupPolicy::Deauthorize,
    ));

    let resp = post_json(router, "/v1/notify", r#"{"email":"a@b.c","error":"x"}"#).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"]["code"], "misconfigured");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn notify_unreachable_postmark_is_bad_gateway() {
    let transport = Arc::new(FakeTransport::new().on(
        Method::POST,
        postmark_url(),
        Reply::Fail("connection refused".to_string()),
    ));

    let resp = post_json(
        router_with(&transport),
        "/v1/notify",
        r#"{"email":"a@b.c","error":"x"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

// --- registration ---

#[tokio::test]
async fn registration_missing_address_is_unauthorized() {
    let transport = Arc::new(FakeTransport::new());
    let resp = post_json(
        router_with(&transport),
        "/v1/zt_registration",
        r#"{"data":{
            "email":"owner@example.com",
            "holochain_agent_id":"hp1",
            "holoport_url":"https://hp1.holohost.net"
        }}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"]["code"], "invalid_payload");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn registration_rejects_garbage() {
    let bodies = [
        "not json",
        "{}",
        r#"{"data":null}"#,
        r#"{"data":{"zerotier_address":"","email":"e","holochain_agent_id":"hp1"}}"#,
    ];

    for body in bodies {
        let transport = Arc::new(FakeTransport::new());
        let resp = post_json(router_with(&transport), "/v1/zt_registration", body).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "body: {body}");
        assert!(transport.requests().is_empty());
    }
}

#[tokio::test]
async fn registration_rejects_addresses_outside_the_member_collection() {
    for address in ["../../OTHERNET/member/deadbeef00", "a1b2c3d4e5/../x", "a1b2c3d4e"] {
        let transport = Arc::new(FakeTransport::new());
        let body = json!({
            "data": {
                "email": "owner@example.com",
                "holochain_agent_id": "hp1",
                "zerotier_address": address,
            }
        });

        let resp = post_json(
            router_with(&transport),
            "/v1/zt_registration",
            &body.to_string(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "address: {address}");
        assert_eq!(body_json(resp).await["error"]["code"], "invalid_payload");
        assert!(transport.requests().is_empty());
    }
}

#[tokio::test]
async fn registration_cleans_up_and_relays_authorization() {
    let member = json!({
        "nodeId": "a1b2c3d4e5",
        "name": "hp1",
        "config": { "authorized": true }
    });
    let transport = Arc::new(
        FakeTransport::new()
            .on(
                Method::GET,
                members_url(),
                Reply::ok(member_list(&[("0000000001", "hp1"), ("0000000002", "hp9")])),
            )
            .on(Method::POST, member_url("a1b2c3d4e5"), Reply::ok(member.clone())),
    );

    let resp = post_json(
        router_with(&transport),
        "/v1/zt_registration",
        r#"{"data":{
            "email":"owner@example.com",
            "holochain_agent_id":"hp1",
            "zerotier_address":"a1b2c3d4e5",
            "holoport_url":"https://hp1.holohost.net"
        }}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, member);

    let stale = transport.requests_to(&Method::POST, &member_url("0000000001"));
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].body, Some(json!({ "config": { "authorized": false } })));
    assert!(transport.requests_to(&Method::POST, &member_url("0000000002")).is_empty());

    let auth = transport.requests_to(&Method::POST, &member_url("a1b2c3d4e5"));
    assert_eq!(
        auth[0].body,
        Some(json!({
            "config": { "authorized": true },
            "description": "owner@example.com",
            "name": "hp1"
        }))
    );
}

#[tokio::test]
async fn registration_relays_zerotier_rejection() {
    let transport = Arc::new(
        FakeTransport::new()
            .on(Method::GET, members_url(), Reply::ok(member_list(&[])))
            .on(
                Method::POST,
                member_url("a1b2c3d4e5"),
                Reply::raw(StatusCode::FORBIDDEN, "forbidden"),
            ),
    );

    let resp = post_json(
        router_with(&transport),
        "/v1/zt_registration",
        r#"{"data":{"email":"e","holochain_agent_id":"hp1","zerotier_address":"a1b2c3d4e5"}}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_bytes(resp).await, b"forbidden");
}

#[tokio::test]
async fn registration_unreachable_zerotier_is_bad_gateway() {
    let transport = Arc::new(
        FakeTransport::new()
            .on(Method::GET, members_url(), Reply::Fail("refused".to_string()))
            .on(
                Method::POST,
                member_url("a1b2c3d4e5"),
                Reply::Fail("refused".to_string()),
            ),
    );

    let resp = post_json(
        router_with(&transport),
        "/v1/zt_registration",
        r#"{"data":{"email":"e","holochain_agent_id":"hp1","zerotier_address":"a1b2c3d4e5"}}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["error"]["code"], "upstream_unreachable");
}

// --- health ---

#[tokio::test]
async fn health_reports_ok() {
    let transport = Arc::new(FakeTransport::new());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("failed to build request");

    let resp = router_with(&transport).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
