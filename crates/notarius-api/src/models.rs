//! Request and response bodies.

use chrono::{DateTime, Utc};
use notarius_verifier::{ErrorKind, SignatureLevel, VerificationVerdict};
use serde::{Deserialize, Serialize};

/// Body of `POST /verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    /// Hex SHA-256 of the document.
    pub hash: String,
    /// Standard-base64 protobuf signature artifact.
    pub signature: String,
    /// Force long-term validation on or off for this request.
    #[serde(default)]
    pub ltv: Option<bool>,
}

/// Body of every `POST /verify` response.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    /// Whether the signature is valid for the hash.
    pub valid: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Verified signer email.
    pub signer_email: Option<String>,
    /// Assurance level.
    pub signature_level: Option<SignatureLevel>,
    /// Token issuance time.
    pub signature_time: Option<DateTime<Utc>>,
}

impl VerifyResponse {
    /// A rejection that never reached the verification engine.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            error_kind: None,
            signer_email: None,
            signature_level: None,
            signature_time: None,
        }
    }
}

impl From<VerificationVerdict> for VerifyResponse {
    fn from(verdict: VerificationVerdict) -> Self {
        Self {
            valid: verdict.valid,
            error: verdict.error,
            error_kind: verdict.error_kind,
            signer_email: verdict.signer_email,
            signature_level: verdict.signature_level,
            signature_time: verdict.signature_time,
        }
    }
}

/// Body of `GET /healthz`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: &'static str,
}
