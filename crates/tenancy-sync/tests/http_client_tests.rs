//! HTTP client tests for the events API and the director write API.

use std::collections::BTreeMap;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenancy_sync::director::{DirectorWriteClient, HttpDirectorClient};
use tenancy_sync::error::SyncError;
use tenancy_sync::events::{EventApiClient, EventKind, HttpEventApiClient};
use tenancy_sync::model::{TenantRecord, TenantType, TenantWriteInput};

fn events_client(server: &MockServer) -> HttpEventApiClient {
    HttpEventApiClient::with_http_client(reqwest::Client::new())
        .with_endpoint(
            EventKind::CreatedSubaccount,
            format!("{}/events/subaccounts/created", server.uri()),
        )
        .with_bearer_token("events-token")
}

fn params() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("pageNum".to_string(), "1".to_string()),
        ("pageSize".to_string(), "150".to_string()),
        ("timestamp".to_string(), "1714564800000".to_string()),
    ])
}

fn director_client(server: &MockServer) -> HttpDirectorClient {
    HttpDirectorClient::with_http_client(format!("{}/graphql", server.uri()), reqwest::Client::new())
        .with_bearer_token("director-token")
}

fn write_input(id: &str) -> TenantWriteInput {
    TenantWriteInput::from(
        &TenantRecord::new(id, id, TenantType::Subaccount, "external-provider")
            .with_parent("id-ga-1")
            .with_region("cf-eu10"),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Events API
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_fetch_page_sends_query_and_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/subaccounts/created"))
        .and(query_param("pageNum", "1"))
        .and(query_param("pageSize", "150"))
        .and(query_param("timestamp", "1714564800000"))
        .and(header("Authorization", "Bearer events-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "totalPages": 1,
            "events": [{ "type": "Subaccount", "eventData": { "guid": "sub-1" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = events_client(&server)
        .fetch_page(EventKind::CreatedSubaccount, &params())
        .await
        .unwrap()
        .expect("page should be present");

    assert_eq!(page.get_i64("total"), 1);
    assert_eq!(page.get_i64("totalPages"), 1);
}

#[tokio::test]
async fn test_fetch_page_no_content_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/subaccounts/created"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let page = events_client(&server)
        .fetch_page(EventKind::CreatedSubaccount, &params())
        .await
        .unwrap();

    assert!(page.is_none());
}

#[tokio::test]
async fn test_fetch_page_server_error_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/subaccounts/created"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = events_client(&server)
        .fetch_page(EventKind::CreatedSubaccount, &params())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    match err {
        SyncError::EventApi { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_page_client_error_is_not_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/subaccounts/created"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = events_client(&server)
        .fetch_page(EventKind::CreatedSubaccount, &params())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(matches!(err, SyncError::EventApi { status: 401, .. }));
}

#[tokio::test]
async fn test_fetch_page_invalid_json_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/subaccounts/created"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = events_client(&server)
        .fetch_page(EventKind::CreatedSubaccount, &params())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Decode { .. }));
}

#[tokio::test]
async fn test_fetch_page_unconfigured_kind_is_rejected() {
    let server = MockServer::start().await;

    let err = events_client(&server)
        .fetch_page(EventKind::DeletedAccount, &params())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Configuration { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════
// Director write API
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_write_tenants_posts_mutation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("Authorization", "Bearer director-token"))
        .and(body_string_contains("writeTenants"))
        .and(body_partial_json(json!({
            "variables": { "in": [{
                "externalTenant": "sub-1",
                "parents": ["id-ga-1"],
                "region": "cf-eu10",
                "type": "subaccount"
            }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "writeTenants": ["id-sub-1"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    director_client(&server)
        .write_tenants(&[write_input("sub-1")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_tenant_sends_internal_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("updateTenant"))
        .and(body_partial_json(json!({ "variables": { "id": "id-sub-1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "updateTenant": { "id": "id-sub-1" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    director_client(&server)
        .update_tenant("id-sub-1", &write_input("sub-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_graphql_errors_fail_the_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "tenant sub-1 is locked" }]
        })))
        .mount(&server)
        .await;

    let err = director_client(&server)
        .delete_tenants(&[write_input("sub-1")])
        .await
        .unwrap_err();

    match err {
        SyncError::Director { message } => assert!(message.contains("tenant sub-1 is locked")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_director_http_error_fails_the_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let err = director_client(&server)
        .write_tenants(&[write_input("sub-1")])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Director { .. }));
}
