//! Gateway behavior seen from the outside.
//!
//! Guarantees exercised here:
//! - Every request carries the bearer token, the organization taken from the
//!   active route and a JSON content type unless it is multipart.
//! - 401 signs the user out everywhere; 406 lands on not-found.
//! - An unresolved organization falls back to the empty sentinel, or is
//!   refused locally in strict mode.

use loandesk_client::{
    ApiRequest, ApiResponse, ClientConfig, FailureKind, Method, OrganizationFallback, Route,
    SessionStore, TransportError,
};
use loandesk_core::Attachment;
use loandesk_test_utils::{Harness, TEST_ORGANIZATION, TEST_TOKEN};
use pretty_assertions::assert_eq;
use serde_json::{json, Map};

#[tokio::test]
async fn requests_carry_session_context() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(200, json!({"data": [{"q": 1}]}));

    let response = harness
        .client
        .gateway()
        .call(ApiRequest::get("/question").with_header("X-Trace", "t1"))
        .await;
    assert_eq!(response, ApiResponse::Data(json!([{"q": 1}])));

    let request = harness.transport.last_request().unwrap();
    assert_eq!(request.path, "/question");
    assert_eq!(request.header("authorization"), Some(format!("Bearer {TEST_TOKEN}").as_str()));
    assert_eq!(request.header("organization"), Some(TEST_ORGANIZATION));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("x-trace"), Some("t1"));
}

#[tokio::test]
async fn multipart_requests_leave_content_type_to_the_transport() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(200, json!({"data": {"_id": "F100"}}));

    let attachment = Attachment {
        field: "photo".into(),
        file_name: "front.jpg".into(),
        mime: "image/jpeg".into(),
        bytes: vec![0xFF, 0xD8],
    };
    harness
        .client
        .gateway()
        .call(ApiRequest::multipart(
            Method::Post,
            "/customer-file/customer_photos/F100",
            Map::new(),
            vec![attachment],
        ))
        .await;

    let request = harness.transport.last_request().unwrap();
    assert_eq!(request.header("content-type"), None);
    assert!(request.body.is_multipart());
}

/// Tenet: a 401 is handled by the gateway itself, whoever asked.
#[tokio::test]
async fn unauthorized_clears_session_and_storage() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(401, json!({"message": "jwt expired"}));

    let response = harness.client.gateway().call(ApiRequest::get("/client-ledger")).await;

    assert_eq!(response.status(), Some(401));
    assert!(!harness.client.session().is_authenticated());
    assert_eq!(harness.client.session().token(), None);
    assert!(harness.store.is_empty().unwrap());
    assert_eq!(harness.client.navigation().current(), Route::login());
}

#[tokio::test]
async fn not_acceptable_redirects_without_signing_out() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(406, json!({"message": "not your file"}));

    let err = harness
        .client
        .gateway()
        .call(ApiRequest::get("/collection/dashboard"))
        .await
        .into_json()
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::AccessDenied);
    assert_eq!(harness.client.navigation().current(), Route::not_found());
    assert!(harness.client.session().is_authenticated());
}

#[tokio::test]
async fn missing_organization_sends_empty_sentinel() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.client.navigation().navigate(Route::new("/"));
    harness.transport.push_json(200, json!({"data": {}}));

    harness.client.gateway().call(ApiRequest::get("/collection/dashboard")).await;

    let request = harness.transport.last_request().unwrap();
    assert_eq!(request.header("organization"), Some(""));
}

#[tokio::test]
async fn strict_mode_refuses_unscoped_routes_locally() {
    let config = ClientConfig::new().with_organization_fallback(OrganizationFallback::Reject);
    let harness = Harness::signed_in(config);
    harness.client.navigation().navigate(Route::new("/"));

    let err = harness
        .client
        .gateway()
        .call(ApiRequest::get("/collection/dashboard"))
        .await
        .into_json()
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::UnexpectedError);
    assert_eq!(harness.transport.request_count(), 0);

    // sign-in flows never need an organization
    harness.transport.push_json(200, json!({"data": {}}));
    let response = harness
        .client
        .gateway()
        .call(ApiRequest::post("/auth/forgot-password", json!({"email": "a@b.c"})).unscoped())
        .await;
    assert!(matches!(response, ApiResponse::Data(_)));
}

#[tokio::test]
async fn transport_failures_are_transient() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_error(TransportError::Timeout);

    let response = harness.client.gateway().call(ApiRequest::get("/question")).await;
    assert_eq!(response.status(), None);

    let err = response.into_json().unwrap_err();
    assert_eq!(err.kind(), FailureKind::TransientNetworkError);
    assert!(err.is_retryable());
    assert!(harness.client.session().is_authenticated());
}

#[tokio::test]
async fn signed_out_requests_omit_authorization() {
    let harness = Harness::new(ClientConfig::new());
    harness.transport.push_json(200, json!({"data": {}}));

    harness
        .client
        .gateway()
        .call(ApiRequest::post("/auth/login", json!({})).unscoped())
        .await;

    let request = harness.transport.last_request().unwrap();
    assert_eq!(request.header("authorization"), None);
    assert_eq!(request.header("organization"), Some(""));
}
