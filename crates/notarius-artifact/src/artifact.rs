//! The signature artifact submitted for verification.
//!
//! A [`SignatureArtifact`] is decoded once per verification call and is
//! never mutated afterwards. Revocation evidence is keyed by
//! [`certificate_id`], the hex SHA-256 fingerprint of a certificate's DER.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use prost::Message;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ArtifactError;
use crate::wire;

/// Compute the id under which revocation evidence for a certificate is filed.
pub fn certificate_id(certificate_der: &[u8]) -> String {
    hex::encode(Sha256::digest(certificate_der))
}

/// Revocation status asserted by an LTV record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationStatus {
    /// Not revoked at the time the proof was produced.
    Good,
    /// Revoked at the time the proof was produced.
    Revoked,
    /// The responder made no assertion about the certificate.
    Unknown,
}

impl From<wire::RevocationStatus> for RevocationStatus {
    fn from(status: wire::RevocationStatus) -> Self {
        match status {
            wire::RevocationStatus::Good => Self::Good,
            wire::RevocationStatus::Revoked => Self::Revoked,
            wire::RevocationStatus::Unknown => Self::Unknown,
        }
    }
}

impl From<RevocationStatus> for wire::RevocationStatus {
    fn from(status: RevocationStatus) -> Self {
        match status {
            RevocationStatus::Good => Self::Good,
            RevocationStatus::Revoked => Self::Revoked,
            RevocationStatus::Unknown => Self::Unknown,
        }
    }
}

/// Revocation proof for a single certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LtvRecord {
    /// Id of the certificate this proof covers.
    pub certificate_id: String,
    /// DER-encoded X.509 name of the proof signer.
    pub signer: Vec<u8>,
    /// Asserted revocation status.
    pub status: RevocationStatus,
    /// When the proof was produced.
    pub produced_at: DateTime<Utc>,
    /// Signature over [`LtvRecord::unsigned_canonical_bytes`].
    pub signature: Vec<u8>,
}

impl LtvRecord {
    /// The bytes the proof signer signs: the protobuf encoding of this
    /// record with the `signature` field cleared.
    pub fn unsigned_canonical_bytes(&self) -> Vec<u8> {
        let mut unsigned = wire::LtvRecord::from(self);
        unsigned.signature.clear();
        unsigned.encode_to_vec()
    }

    fn from_wire(key: &str, record: wire::LtvRecord) -> Result<Self, ArtifactError> {
        let produced_at = DateTime::from_timestamp(record.produced_at, 0).ok_or_else(|| {
            ArtifactError::InvalidRecord {
                certificate_id: key.to_owned(),
                reason: format!("production time {} is out of range", record.produced_at),
            }
        })?;
        let status = record.status().into();

        Ok(Self {
            certificate_id: record.certificate_id,
            signer: record.signer,
            status,
            produced_at,
            signature: record.signature,
        })
    }
}

impl From<&LtvRecord> for wire::LtvRecord {
    fn from(record: &LtvRecord) -> Self {
        Self {
            certificate_id: record.certificate_id.clone(),
            signer: record.signer.clone(),
            status: wire::RevocationStatus::from(record.status) as i32,
            produced_at: record.produced_at.timestamp(),
            signature: record.signature.clone(),
        }
    }
}

/// A decoded signature file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureArtifact {
    /// Compact JWS ID token bytes.
    pub identity_token: Vec<u8>,
    /// JWK of the identity provider, including its certificate chain.
    pub identity_provider_key: Vec<u8>,
    /// Revocation evidence keyed by certificate id.
    pub revocation_evidence: BTreeMap<String, LtvRecord>,
}

impl SignatureArtifact {
    /// Decode a raw protobuf signature file.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protobuf`] if the framing is invalid, or
    /// [`ArtifactError::InvalidRecord`] if an LTV record cannot be
    /// represented.
    pub fn from_protobuf(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let file = wire::SignatureFile::decode(bytes)?;

        let revocation_evidence = file
            .ltv_idp
            .into_iter()
            .map(|(key, record)| {
                let record = LtvRecord::from_wire(&key, record)?;
                Ok((key, record))
            })
            .collect::<Result<BTreeMap<_, _>, ArtifactError>>()?;

        Ok(Self {
            identity_token: file.id_token,
            identity_provider_key: file.jwk_idp,
            revocation_evidence,
        })
    }

    /// Decode the standard-base64 text form carried by verify requests.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Base64`] for invalid base64, otherwise the
    /// errors of [`SignatureArtifact::from_protobuf`].
    pub fn from_base64(text: &str) -> Result<Self, ArtifactError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| ArtifactError::Base64(e.to_string()))?;
        Self::from_protobuf(&bytes)
    }

    /// Load a signature file from disk.
    ///
    /// Accepts either the raw protobuf encoding or its base64 text form.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::IoError`] if the file cannot be read, or a
    /// decoding error if neither form decodes.
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let data = std::fs::read(path)?;

        if let Ok(text) = std::str::from_utf8(&data) {
            if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(text.trim()) {
                tracing::debug!(path = %path.display(), "reading base64 signature file");
                return Self::from_protobuf(&bytes);
            }
        }

        tracing::debug!(path = %path.display(), "reading raw protobuf signature file");
        Self::from_protobuf(&data)
    }

    /// Encode as a raw protobuf signature file.
    pub fn to_protobuf(&self) -> Vec<u8> {
        let file = wire::SignatureFile {
            id_token: self.identity_token.clone(),
            jwk_idp: self.identity_provider_key.clone(),
            ltv_idp: self
                .revocation_evidence
                .iter()
                .map(|(key, record)| (key.clone(), wire::LtvRecord::from(record)))
                .collect(),
        };
        file.encode_to_vec()
    }

    /// Encode as the standard-base64 text form.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_protobuf())
    }
}
