//! HTTP store tests against a mock server: wire shape, auth header, and
//! error mapping.

use formbridge_registry::GlobalSettings;
use formbridge_sync::{ExternalStore, HttpExternalStore, SyncError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(base_url: &str) -> GlobalSettings {
    GlobalSettings {
        base_url: base_url.to_string(),
        default_timeout_secs: 5,
        naming: "EID".to_string(),
    }
}

async fn store(server: &MockServer) -> HttpExternalStore {
    HttpExternalStore::new(&settings(&server.uri()), Some("a2V5OnNlY3JldA==".to_string())).unwrap()
}

#[tokio::test]
async fn fetch_all_parses_the_record_map_and_skips_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts"))
        .and(query_param("api", ""))
        .and(query_param("naming", "EID"))
        .and(header("Authorization", "Basic a2V5OnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_metaData": {"count": 2},
            "7": {"1000001": "A-1", "_lastModified": "2026-03-01T10:00:00Z"},
            "9": {"1000001": "A-2"}
        })))
        .mount(&server)
        .await;

    let records = store(&server).await.fetch_all("/crm/accounts").await.unwrap();
    assert_eq!(records.len(), 2);

    let first = records.iter().find(|r| r.id == "7").unwrap();
    assert_eq!(first.fields["1000001"], json!("A-1"));
    assert!(first.modified_at.is_some());

    let second = records.iter().find(|r| r.id == "9").unwrap();
    assert!(second.modified_at.is_none());
}

#[tokio::test]
async fn fetch_one_maps_not_found_and_empty_body_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts/9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"1000001": "A-9"})),
        )
        .mount(&server)
        .await;

    let store = store(&server).await;
    assert!(store.fetch_one("/crm/accounts", "404").await.unwrap().is_none());
    assert!(store.fetch_one("/crm/accounts", "8").await.unwrap().is_none());

    let record = store.fetch_one("/crm/accounts", "9").await.unwrap().unwrap();
    assert_eq!(record.id, "9");
    assert_eq!(record.fields["1000001"], json!("A-9"));
}

#[tokio::test]
async fn create_returns_the_assigned_record_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/accounts"))
        .and(query_param("api", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_recordId": 812})))
        .mount(&server)
        .await;

    let fields = json!({"1000001": "A-1"}).as_object().cloned().unwrap();
    let id = store(&server).await.create("/crm/accounts", &fields).await.unwrap();
    assert_eq!(id, "812");
}

#[tokio::test]
async fn create_without_a_record_id_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .mount(&server)
        .await;

    let fields = json!({"1000001": "A-1"}).as_object().cloned().unwrap();
    let err = store(&server).await.create("/crm/accounts", &fields).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
}

#[tokio::test]
async fn delete_distinguishes_missing_records() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/crm/accounts/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/crm/accounts/8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = store(&server).await;
    assert!(store.delete("/crm/accounts", "7").await.unwrap());
    assert!(!store.delete("/crm/accounts", "8").await.unwrap());
}

#[tokio::test]
async fn unexpected_status_carries_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance window"))
        .mount(&server)
        .await;

    let err = store(&server).await.fetch_all("/crm/accounts").await.unwrap_err();
    match err {
        SyncError::UnexpectedStatus { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance window");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn requests_without_an_api_key_omit_the_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let store = HttpExternalStore::new(&settings(&server.uri()), None).unwrap();
    let records = store.fetch_all("/crm/accounts").await.unwrap();
    assert!(records.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("Authorization").is_none());
}
