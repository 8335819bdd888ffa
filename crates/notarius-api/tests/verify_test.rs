use axum::http::StatusCode;
use axum_test::TestServer;
use notarius_api::router::{AppState, build_router};
use notarius_verifier::Verifier;
use notarius_verifier::binding::sha256_hex;
use notarius_verifier::fixtures::{EMAIL, Fixture};
use serde_json::{Value, json};

fn server(fixture: &Fixture) -> TestServer {
    let verifier = Verifier::new(fixture.trust_config());
    TestServer::new(build_router(AppState::new(verifier))).expect("test server")
}

#[tokio::test]
async fn health_returns_200() {
    let fixture = Fixture::new();
    let response = server(&fixture).get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn valid_signature_returns_200() {
    let fixture = Fixture::new();
    let hash = sha256_hex(b"doc-A");
    let artifact = fixture.artifact(&hash);

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": hash, "signature": artifact.to_base64() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["signer_email"], EMAIL);
    assert_eq!(body["signature_level"], "long_term");
    assert_eq!(body["signature_time"], "2023-06-01T12:00:00Z");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn ltv_can_be_skipped_per_request() {
    let fixture = Fixture::new();
    let hash = sha256_hex(b"doc-A");
    let artifact = fixture.artifact(&hash);

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": hash, "signature": artifact.to_base64(), "ltv": false }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["signature_level"], "basic");
}

#[tokio::test]
async fn hash_mismatch_returns_500() {
    let fixture = Fixture::new();
    let artifact = fixture.artifact(&sha256_hex(b"doc-A"));

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": sha256_hex(b"doc-B"), "signature": artifact.to_base64() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["error_kind"], "hash_mismatch");
    assert!(body["signer_email"].is_null());
}

#[tokio::test]
async fn untrusted_root_returns_500() {
    let fixture = Fixture::new();
    let stranger = Fixture::new();
    let hash = sha256_hex(b"doc-A");

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": hash, "signature": stranger.artifact(&hash).to_base64() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error_kind"], "untrusted_chain");
}

#[tokio::test]
async fn malformed_base64_returns_400() {
    let fixture = Fixture::new();
    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": "00", "signature": "!!! not base64 !!!" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["error_kind"], "malformed_artifact");
}

#[tokio::test]
async fn malformed_protobuf_returns_400() {
    let fixture = Fixture::new();
    // Field 1, length-delimited, claims 10 bytes but provides 1.
    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": "00", "signature": "CgoB" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn undecodable_token_returns_400() {
    let fixture = Fixture::new();
    let hash = sha256_hex(b"doc-A");
    let artifact =
        fixture.artifact_with(b"not-a-jws".to_vec(), fixture.jwk(), fixture.ltv_evidence());

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": hash, "signature": artifact.to_base64() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["error_kind"], "malformed_token");
}

#[tokio::test]
async fn undecodable_key_returns_400() {
    let fixture = Fixture::new();
    let hash = sha256_hex(b"doc-A");
    let artifact = fixture.artifact_with(
        fixture.token(&fixture.claims(&hash)).into_bytes(),
        b"{\"kty\":\"oct\"}".to_vec(),
        fixture.ltv_evidence(),
    );

    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": hash, "signature": artifact.to_base64() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error_kind"], "malformed_key");
}

#[tokio::test]
async fn invalid_json_returns_400() {
    let fixture = Fixture::new();
    let response = server(&fixture).post("/verify").text("not json").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.contains("invalid request body"))
    );
}

#[tokio::test]
async fn missing_field_returns_400() {
    let fixture = Fixture::new();
    let response = server(&fixture)
        .post("/verify")
        .json(&json!({ "hash": "00" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
