#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use purelink_api::{ApiCredentials, CloudClient, Error};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/", server.uri())).unwrap();
    let client = CloudClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn creds() -> ApiCredentials {
    ApiCredentials {
        account: "acct-1".into(),
        password: SecretString::from("api-secret".to_string()),
    }
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_authenticate_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/userregistration/authenticate"))
        .and(query_param("country", "DE"))
        .and(body_json(json!({ "Email": "me@example.com", "Password": "hunter2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Account": "acct-1", "Password": "api-secret" })),
        )
        .mount(&server)
        .await;

    let password = SecretString::from("hunter2".to_string());
    let creds = client
        .authenticate("me@example.com", &password, "DE")
        .await
        .unwrap();

    assert_eq!(creds.account, "acct-1");
    assert_eq!(creds.password.expose_secret(), "api-secret");
}

#[tokio::test]
async fn test_authenticate_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/userregistration/authenticate"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let password = SecretString::from("wrong".to_string());
    let result = client.authenticate("me@example.com", &password, "DE").await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

// ── Manifest tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_inventory() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/provisioningservice/manifest"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "Serial": "NN2-EU-HKA0001A",
                "Name": "Living Room",
                "ProductType": "475",
                "LocalCredentials": "c2VjcmV0",
                "Version": "21.03.08",
                "ScaleUnit": "C"
            },
            {
                "Serial": "NN2-EU-HKA0002A",
                "Name": "Office",
                "ProductType": "469",
                "LocalCredentials": "c2VjcmV0"
            }
        ])))
        .mount(&server)
        .await;

    let entries = client.fetch_inventory(&creds()).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].serial, "NN2-EU-HKA0001A");
    assert_eq!(entries[0].name, "Living Room");
    assert_eq!(entries[0].scale_unit.as_deref(), Some("C"));
    assert_eq!(entries[1].product_type, "469");
}

#[tokio::test]
async fn test_fetch_inventory_drops_malformed_records() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/provisioningservice/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Name": "No serial", "ProductType": "475", "LocalCredentials": "x" },
            {
                "Serial": "NN2-EU-HKA0003A",
                "Name": "Hall",
                "ProductType": "455",
                "LocalCredentials": "x"
            }
        ])))
        .mount(&server)
        .await;

    let entries = client.fetch_inventory(&creds()).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].serial, "NN2-EU-HKA0003A");
}

#[tokio::test]
async fn test_fetch_inventory_unauthorized_is_session_expired() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/provisioningservice/manifest"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.fetch_inventory(&creds()).await.unwrap_err();
    assert!(err.is_auth_expired(), "expected SessionExpired, got: {err:?}");
}

#[tokio::test]
async fn test_fetch_inventory_server_error_is_not_empty() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/provisioningservice/manifest"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.fetch_inventory(&creds()).await.unwrap_err();
    assert!(
        matches!(err, Error::Status { status: 503, .. }),
        "expected Status error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_inventory_invalid_json() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/provisioningservice/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.fetch_inventory(&creds()).await.unwrap_err();
    assert!(
        matches!(err, Error::Deserialization { .. }),
        "expected Deserialization error, got: {err:?}"
    );
}
