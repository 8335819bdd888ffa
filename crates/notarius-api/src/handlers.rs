//! Request handlers.

use std::sync::Arc;

use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use notarius_artifact::SignatureArtifact;
use notarius_verifier::{ErrorClass, VerificationError, VerificationVerdict, VerifyOptions};
use tracing::Instrument;

use crate::models::{HealthResponse, VerifyRequest, VerifyResponse};
use crate::router::AppState;

/// Response header carrying the request's log correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `GET /healthz`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `POST /verify`: verify a signature artifact against a document hash.
///
/// `400` for bodies, artifacts, keys or tokens that cannot be decoded,
/// `500` for any other failed verification, `200` for a valid signature.
pub async fn verify_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = new_request_id();
    let span = tracing::info_span!("verify_request", %request_id);

    let (status, body) = verify(state, body).instrument(span).await;

    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn verify(state: AppState, body: Bytes) -> (StatusCode, VerifyResponse) {
    let request: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "invalid request body");
            return (
                StatusCode::BAD_REQUEST,
                VerifyResponse::rejected(format!("invalid request body: {e}")),
            );
        }
    };

    let artifact = match SignatureArtifact::from_base64(&request.signature) {
        Ok(artifact) => artifact,
        Err(e) => {
            let err = VerificationError::from(e);
            tracing::warn!(error = %err, "undecodable signature artifact");
            return (
                StatusCode::BAD_REQUEST,
                VerificationVerdict::failure(&err).into(),
            );
        }
    };

    let verifier = Arc::clone(&state.verifier);
    let options = VerifyOptions {
        long_term: request.ltv,
    };
    let hash = request.hash;
    let span = tracing::Span::current();
    let outcome = tokio::task::spawn_blocking(move || {
        span.in_scope(|| verifier.verify(&artifact, &hash, options))
    })
    .await;

    match outcome {
        Ok(verdict) if verdict.valid => (StatusCode::OK, verdict.into()),
        // An undecodable key or token is the client's fault like any other
        // undecodable input; every other failed check is a 500.
        Ok(verdict) if verdict.error_class == Some(ErrorClass::Input) => {
            (StatusCode::BAD_REQUEST, verdict.into())
        }
        Ok(verdict) => (StatusCode::INTERNAL_SERVER_ERROR, verdict.into()),
        Err(e) => {
            tracing::error!(error = %e, "verification task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                VerifyResponse::rejected("verification task failed"),
            )
        }
    }
}

/// 16 random bytes, standard base64.
fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    if SystemRandom::new().fill(&mut bytes).is_err() {
        tracing::warn!("system randomness unavailable for request id");
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
