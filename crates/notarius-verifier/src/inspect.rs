//! Human-readable artifact display.
//!
//! Decodes what an artifact carries without trusting any of it: token
//! header and claims are shown unverified, and parts that fail to decode
//! are reported inline rather than aborting the display.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use notarius_artifact::{RevocationStatus, SignatureArtifact};
use serde::Serialize;
use x509_cert::der::Decode;
use x509_cert::name::Name;

use crate::signature::IdentityProviderKey;
use crate::token::{CompactJws, JwsHeader};

/// Unverified identity token contents.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    /// JOSE header.
    pub header: JwsHeader,
    /// Claims as sent.
    pub claims: serde_json::Value,
}

/// One certificate of the key's chain.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    /// Subject DN.
    pub subject: String,
    /// Issuer DN.
    pub issuer: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// Certificate id.
    pub id: String,
    /// Whether the certificate is a CA.
    pub is_ca: bool,
}

/// The identity provider key.
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    /// Key type, e.g. `EC P-256`.
    pub key_type: String,
    /// Key id.
    pub kid: Option<String>,
    /// Declared algorithm.
    pub alg: Option<String>,
    /// Chain, leaf first.
    pub chain: Vec<CertificateSummary>,
}

/// One revocation record.
#[derive(Debug, Clone, Serialize)]
pub struct LtvSummary {
    /// Map key the record is filed under.
    pub filed_under: String,
    /// Certificate id inside the record.
    pub certificate_id: String,
    /// Signer DN, if it decodes.
    pub signer: Option<String>,
    /// Asserted status.
    pub status: RevocationStatus,
    /// Production time.
    pub produced_at: DateTime<Utc>,
    /// Whether the record is filed under a certificate of the key's chain.
    pub covers_chain_certificate: bool,
}

/// Everything an artifact carries, decoded as far as possible.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    /// Token contents.
    pub token: Result<TokenSummary, String>,
    /// Key contents.
    pub key: Result<KeySummary, String>,
    /// Revocation records, ordered by map key.
    pub ltv_records: Vec<LtvSummary>,
}

/// Decode the parts of `artifact` for display.
pub fn summarize(artifact: &SignatureArtifact) -> ArtifactSummary {
    let token = CompactJws::parse(&artifact.identity_token)
        .map_err(|e| e.to_string())
        .and_then(|jws| {
            let claims = serde_json::from_slice(&jws.payload)
                .map_err(|e| format!("claims are not JSON: {e}"))?;
            Ok(TokenSummary {
                header: jws.header,
                claims,
            })
        });

    let key = IdentityProviderKey::from_jwk(&artifact.identity_provider_key)
        .map(|key| KeySummary {
            key_type: key.material.describe(),
            kid: key.kid.clone(),
            alg: key.algorithm.map(|alg| alg.as_str().to_owned()),
            chain: key
                .chain
                .iter()
                .map(|cert| CertificateSummary {
                    subject: cert.subject(),
                    issuer: cert.issuer(),
                    not_before: cert.not_before(),
                    not_after: cert.not_after(),
                    id: cert.id().to_owned(),
                    is_ca: cert.is_ca(),
                })
                .collect(),
        })
        .map_err(|e| e.to_string());

    let chain_ids: Vec<&str> = key
        .as_ref()
        .map(|key| key.chain.iter().map(|cert| cert.id.as_str()).collect())
        .unwrap_or_default();

    let ltv_records = artifact
        .revocation_evidence
        .iter()
        .map(|(filed_under, record)| LtvSummary {
            filed_under: filed_under.clone(),
            certificate_id: record.certificate_id.clone(),
            signer: Name::from_der(&record.signer).ok().map(|name| name.to_string()),
            status: record.status,
            produced_at: record.produced_at,
            covers_chain_certificate: chain_ids.contains(&filed_under.as_str()),
        })
        .collect();

    ArtifactSummary {
        token,
        key,
        ltv_records,
    }
}

/// Format a summary as a human-readable string.
pub fn format_summary(summary: &ArtifactSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Signature Artifact (unverified)");
    let _ = writeln!(out, "-------------------------------");

    match &summary.token {
        Ok(token) => {
            let claim = |name: &str| {
                token
                    .claims
                    .get(name)
                    .map(|value| match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default()
            };
            let _ = writeln!(out, "Algorithm:       {}", token.header.alg);
            let _ = writeln!(out, "Issuer:          {}", claim("iss"));
            let _ = writeln!(out, "Audience:        {}", claim("aud"));
            let _ = writeln!(out, "Email:           {}", claim("email"));
            let _ = writeln!(out, "Email verified:  {}", claim("email_verified"));
            let _ = writeln!(out, "Issued at:       {}", unix_claim(&token.claims, "iat"));
            let _ = writeln!(out, "Expires at:      {}", unix_claim(&token.claims, "exp"));
            let _ = writeln!(out, "Nonce:           {}", claim("nonce"));
        }
        Err(e) => {
            let _ = writeln!(out, "Token:           undecodable ({e})");
        }
    }

    let _ = writeln!(out);
    match &summary.key {
        Ok(key) => {
            let _ = writeln!(out, "Key type:        {}", key.key_type);
            let _ = writeln!(out, "Key id:          {}", key.kid.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "Certificate chain ({}):", key.chain.len());
            for (index, cert) in key.chain.iter().enumerate() {
                let _ = writeln!(out, "  [{index}] {}", cert.subject);
                let _ = writeln!(out, "      issuer:   {}", cert.issuer);
                let _ = writeln!(
                    out,
                    "      valid:    {} .. {}",
                    cert.not_before.to_rfc3339(),
                    cert.not_after.to_rfc3339()
                );
                let _ = writeln!(out, "      id:       {}", cert.id);
            }
        }
        Err(e) => {
            let _ = writeln!(out, "Key:             undecodable ({e})");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "LTV records ({}):", summary.ltv_records.len());
    for record in &summary.ltv_records {
        let status = match record.status {
            RevocationStatus::Good => "good",
            RevocationStatus::Revoked => "revoked",
            RevocationStatus::Unknown => "unknown",
        };
        let _ = writeln!(
            out,
            "  {}  {status}  produced {}{}",
            record.filed_under,
            record.produced_at.to_rfc3339(),
            if record.covers_chain_certificate {
                ""
            } else {
                "  (not in chain)"
            }
        );
        if let Some(signer) = &record.signer {
            let _ = writeln!(out, "      signer:   {signer}");
        }
    }
    out
}

fn unix_claim(claims: &serde_json::Value, name: &str) -> String {
    claims
        .get(name)
        .and_then(serde_json::Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339())
        .unwrap_or_default()
}
