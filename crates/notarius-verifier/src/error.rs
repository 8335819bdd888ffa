//! Error types for the verification engine.

use notarius_artifact::ArtifactError;
use serde::Serialize;

/// Broad classification of a verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed wire encoding, key, or token structure.
    Input,
    /// The identity's credentials cannot be trusted at the reference time.
    Trust,
    /// The token itself fails validation.
    Assertion,
    /// The verified identity does not correspond to the submitted document.
    Binding,
}

/// Stable machine-readable code for each verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The artifact's wire encoding could not be decoded.
    MalformedArtifact,
    /// The identity provider key could not be decoded.
    MalformedKey,
    /// The identity token is not a well-formed signed token.
    MalformedToken,
    /// The token signature does not verify against the embedded key.
    InvalidSignature,
    /// The token was issued by a different issuer.
    IssuerMismatch,
    /// The token was issued for a different client.
    AudienceMismatch,
    /// The reference time is outside the token's validity window.
    Expired,
    /// The token does not carry a verified email.
    EmailNotVerified,
    /// The embedded key does not chain to a trusted root.
    UntrustedChain,
    /// A chain certificate has no revocation evidence.
    #[serde(rename = "missing_ltv_data")]
    MissingLtvData,
    /// Revocation evidence was not signed by the certificate's issuer.
    UntrustedProof,
    /// Revocation evidence was produced outside the allowed window.
    StaleProof,
    /// Revocation evidence asserts the certificate was revoked.
    Revoked,
    /// The token nonce does not match the submitted hash.
    HashMismatch,
}

/// Errors from the verification engine.
///
/// All errors are terminal: verification is a pure function of its
/// inputs and the reference time, so nothing here is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The artifact could not be decoded from its wire form.
    #[error(transparent)]
    MalformedArtifact(#[from] ArtifactError),

    /// The identity provider key could not be decoded.
    #[error("could not decode identity provider key: {0}")]
    MalformedKey(String),

    /// The identity token could not be parsed.
    #[error("could not parse identity token: {0}")]
    MalformedToken(String),

    /// The token signature does not verify.
    #[error("identity token signature verification failed: {0}")]
    InvalidSignature(String),

    /// The token issuer is not the configured issuer.
    #[error("issuer mismatch: expected `{expected}`, got `{actual}`")]
    IssuerMismatch {
        /// Configured issuer.
        expected: String,
        /// Issuer claimed by the token.
        actual: String,
    },

    /// The token audience does not contain the configured client id.
    #[error("audience mismatch: expected `{expected}`, got {actual:?}")]
    AudienceMismatch {
        /// Configured client id.
        expected: String,
        /// Audiences claimed by the token.
        actual: Vec<String>,
    },

    /// The reference time is outside the token's validity window.
    #[error("identity token is not valid at the reference time: {0}")]
    Expired(String),

    /// The token does not carry a verified email.
    #[error("e-mail was not verified: {0}")]
    EmailNotVerified(String),

    /// The embedded key does not chain to a trusted root.
    #[error("untrusted certificate chain: {0}")]
    UntrustedChain(String),

    /// No revocation evidence was supplied for a chain certificate.
    #[error("missing LTV data for certificate `{subject}` ({certificate_id})")]
    MissingLtvData {
        /// Id of the certificate lacking evidence.
        certificate_id: String,
        /// Subject of the certificate lacking evidence.
        subject: String,
    },

    /// Revocation evidence was not produced by the certificate's issuer.
    #[error("untrusted LTV proof for certificate {certificate_id}: {reason}")]
    UntrustedProof {
        /// Id of the certificate the proof is filed under.
        certificate_id: String,
        /// Why the proof is not trusted.
        reason: String,
    },

    /// Revocation evidence was produced outside the allowed window.
    #[error("stale LTV proof for certificate {certificate_id}: {reason}")]
    StaleProof {
        /// Id of the certificate the proof is filed under.
        certificate_id: String,
        /// How the production time falls outside the window.
        reason: String,
    },

    /// Revocation evidence asserts the certificate was revoked.
    #[error("certificate `{subject}` ({certificate_id}) was revoked")]
    Revoked {
        /// Id of the revoked certificate.
        certificate_id: String,
        /// Subject of the revoked certificate.
        subject: String,
    },

    /// Long-term validation of the identity provider key failed.
    #[error("LTV information for id token not valid: {0}")]
    LongTermValidation(#[source] Box<VerificationError>),

    /// The token nonce does not match the submitted hash.
    #[error("hash mismatch: token nonce `{nonce}` does not bind hash `{hash}`")]
    HashMismatch {
        /// The submitted document hash.
        hash: String,
        /// The nonce carried by the token.
        nonce: String,
    },
}

impl VerificationError {
    /// Machine-readable code for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedArtifact(_) => ErrorKind::MalformedArtifact,
            Self::MalformedKey(_) => ErrorKind::MalformedKey,
            Self::MalformedToken(_) => ErrorKind::MalformedToken,
            Self::InvalidSignature(_) => ErrorKind::InvalidSignature,
            Self::IssuerMismatch { .. } => ErrorKind::IssuerMismatch,
            Self::AudienceMismatch { .. } => ErrorKind::AudienceMismatch,
            Self::Expired(_) => ErrorKind::Expired,
            Self::EmailNotVerified(_) => ErrorKind::EmailNotVerified,
            Self::UntrustedChain(_) => ErrorKind::UntrustedChain,
            Self::MissingLtvData { .. } => ErrorKind::MissingLtvData,
            Self::UntrustedProof { .. } => ErrorKind::UntrustedProof,
            Self::StaleProof { .. } => ErrorKind::StaleProof,
            Self::Revoked { .. } => ErrorKind::Revoked,
            Self::LongTermValidation(inner) => inner.kind(),
            Self::HashMismatch { .. } => ErrorKind::HashMismatch,
        }
    }

    /// Broad classification of this failure.
    pub fn class(&self) -> ErrorClass {
        match self.kind() {
            ErrorKind::MalformedArtifact | ErrorKind::MalformedKey | ErrorKind::MalformedToken => {
                ErrorClass::Input
            }
            ErrorKind::UntrustedChain
            | ErrorKind::MissingLtvData
            | ErrorKind::UntrustedProof
            | ErrorKind::StaleProof
            | ErrorKind::Revoked => ErrorClass::Trust,
            ErrorKind::InvalidSignature
            | ErrorKind::IssuerMismatch
            | ErrorKind::AudienceMismatch
            | ErrorKind::Expired
            | ErrorKind::EmailNotVerified => ErrorClass::Assertion,
            ErrorKind::HashMismatch => ErrorClass::Binding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ltv_annotation_keeps_classification() {
        let inner = VerificationError::Revoked {
            certificate_id: "abc".to_owned(),
            subject: "CN=Leaf".to_owned(),
        };
        let annotated = VerificationError::LongTermValidation(Box::new(inner));

        assert_eq!(annotated.kind(), ErrorKind::Revoked);
        assert_eq!(annotated.class(), ErrorClass::Trust);
        let message = annotated.to_string();
        assert!(message.contains("LTV information"), "got: {message}");
        assert!(message.contains("revoked"), "got: {message}");
    }

    #[test]
    fn malformed_artifact_is_input_error() {
        let err = VerificationError::from(ArtifactError::Base64("bad".to_owned()));
        assert_eq!(err.class(), ErrorClass::Input);
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MissingLtvData).expect("serialize");
        assert_eq!(json, "\"missing_ltv_data\"");
        let json = serde_json::to_string(&ErrorKind::EmailNotVerified).expect("serialize");
        assert_eq!(json, "\"email_not_verified\"");
    }
}
