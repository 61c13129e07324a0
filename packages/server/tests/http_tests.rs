//! HTTP surface: identity, JSON shapes and error mapping.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(
    harness: &TestHarness,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(email) = caller {
        request = request.header("x-user-email", email);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = harness.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn submit_body() -> Value {
    json!({ "eventSlug": EVENT, "groupName": GROUP, "amountCents": 1500, "currency": "eur" })
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let harness = TestHarness::new();

    let (status, body) = send(&harness, "POST", "/api/join-requests", None, Some(submit_body())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn submit_returns_the_camel_case_record() {
    let harness = TestHarness::new();
    create_test_group(&harness.deps).await;

    let (status, body) =
        send(&harness, "POST", "/api/join-requests", Some("A@x.com"), Some(submit_body())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memberEmail"], MEMBER);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payoutReleased"], false);
    assert!(body["scannedAt"].is_null());
}

#[tokio::test]
async fn decision_by_a_stranger_is_forbidden() {
    let harness = TestHarness::new();
    create_test_group(&harness.deps).await;
    let request = submit_request(&harness.deps, MEMBER).await;
    let uri = format!("/api/join-requests/{}/decision", request.id);

    let (status, body) = send(
        &harness,
        "POST",
        &uri,
        Some("someone@x.com"),
        Some(json!({ "decision": "accepted" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) =
        send(&harness, "POST", &uri, Some(OWNER), Some(json!({ "decision": "accepted" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    let (status, body) =
        send(&harness, "POST", &uri, Some(OWNER), Some(json!({ "decision": "refused" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn scan_maps_eligibility_and_repeats() {
    let harness = TestHarness::new();
    create_test_group(&harness.deps).await;
    let scan_body = json!({ "eventSlug": EVENT, "groupName": GROUP, "memberEmail": MEMBER });

    let (status, body) = send(&harness, "POST", "/api/scan", Some(OWNER), Some(scan_body.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "not_eligible");

    accepted_request(&harness.deps, MEMBER).await;

    let (status, first) = send(&harness, "POST", "/api/scan", Some(OWNER), Some(scan_body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["firstScan"], true);
    assert_eq!(first["outcome"], "applied");
    assert_eq!(first["request"]["payoutReleased"], true);

    let (status, second) = send(&harness, "POST", "/api/scan", Some(OWNER), Some(scan_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["firstScan"], false);
    assert_eq!(second["outcome"], "duplicate_suppressed");
    assert_eq!(second["request"]["scannedAt"], first["request"]["scannedAt"]);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let harness = TestHarness::new();
    let uri = format!(
        "/api/join-requests/{}/decision",
        crew_core::common::JoinRequestId::new()
    );

    let (status, body) =
        send(&harness, "POST", &uri, Some(OWNER), Some(json!({ "decision": "accepted" }))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn presence_marks_the_caller_active() {
    let harness = TestHarness::new();

    let (status, _) =
        send(&harness, "POST", "/api/presence", Some(MEMBER), Some(json!({ "active": true }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(harness.deps.visibility.is_active(MEMBER));

    send(&harness, "POST", "/api/presence", Some(MEMBER), Some(json!({ "active": false }))).await;
    assert!(!harness.deps.visibility.is_active(MEMBER));
}

#[tokio::test]
async fn health_reports_the_memory_store() {
    let harness = TestHarness::new();

    let (status, body) = send(&harness, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["kind"], "memory");
}
