//! HTTP adapters against a mock deployment API.

use blueprint_client::{HttpDeployer, HttpHealthProbe};
use blueprint_orchestrator::{
    CaConnection, ComponentPayload, Deployer, EnrollRequest, HealthProbe, ProbeError, Retryable,
};
use blueprint_types::{ComponentKind, RefId};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn deployer(server: &MockServer) -> HttpDeployer {
    HttpDeployer::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn ca_payload() -> ComponentPayload {
    ComponentPayload {
        kind: ComponentKind::Ca,
        ref_id: RefId::new("$ca1"),
        body: json!({"display_name": "Org1 CA", "name": "org1ca", "tags": ["blueprint-x"]}),
    }
}

/// URI of a local port nothing listens on.
fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn ca_connection(server: &MockServer) -> CaConnection {
    CaConnection {
        ca_url: server.uri(),
        ca_name: "ca".into(),
        ca_tls_cert: "CA-TLS".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_provision_posts_body_to_kind_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/components/ca"))
        .and(body_partial_json(json!({"name": "org1ca"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "org1ca",
            "api_url": "https://org1ca:7054",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = deployer(&server).provision(&ca_payload()).await.unwrap();
    assert_eq!(record["id"], json!("org1ca"));
}

#[tokio::test]
async fn test_error_status_keeps_code_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/components/ca"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such cluster"))
        .mount(&server)
        .await;

    let err = deployer(&server).provision(&ca_payload()).await.unwrap_err();
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "no such cluster");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_enroll_returns_certificate_material() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identities/enroll"))
        .and(body_partial_json(json!({
            "enroll_id": "org1admin",
            "ca_name": "ca",
            "ca_tls_cert": "CA-TLS",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cert": "CERT",
            "private_key": "KEY",
            "root_certs": ["ROOT"],
        })))
        .mount(&server)
        .await;

    let enrollment = deployer(&server)
        .enroll_identity(&EnrollRequest {
            ca: ca_connection(&server),
            enroll_id: "org1admin".into(),
            enroll_secret: "pw".into(),
        })
        .await
        .unwrap();
    assert_eq!(enrollment.cert, "CERT");
    assert_eq!(enrollment.root_certs, vec!["ROOT".to_string()]);
}

#[tokio::test]
async fn test_bulk_deprovision_deletes_by_tag() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/components/tags/blueprint-1234"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    deployer(&server)
        .bulk_deprovision("blueprint-1234")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_deployer_is_a_retryable_transport_error() {
    let uri = closed_port_uri();

    let err = HttpDeployer::new(&uri, Duration::from_secs(1))
        .unwrap()
        .provision(&ca_payload())
        .await
        .unwrap_err();
    assert_eq!(err.status, None);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_probe_reads_ca_chain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cainfo"))
        .and(query_param("ca", "tlsca"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"CAChain": "CHAIN"},
        })))
        .mount(&server)
        .await;

    let response = HttpHealthProbe::default()
        .get(&format!("{}/cainfo?ca=tlsca", server.uri()))
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.ca_chain(), Some("CHAIN"));
}

#[tokio::test]
async fn test_probe_tolerates_non_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
        .mount(&server)
        .await;

    let response = HttpHealthProbe::default()
        .get(&format!("{}/healthz", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status, 503);
    assert!(response.body.is_null());
}

#[tokio::test]
async fn test_probe_reports_connection_failures() {
    let uri = closed_port_uri();

    let err = HttpHealthProbe::default()
        .get(&format!("{}/healthz", uri))
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::Connect(_)));
}
