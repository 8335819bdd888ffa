//! Identity token verification.
//!
//! The token is a compact JWS signed by the identity provider key that
//! ships in the same artifact. [`IdentityTokenVerifier`] checks signature,
//! issuer, audience, validity window and verified email, then has the key's
//! certificate chain vouched for and, on request, its revocation evidence
//! checked. On success the token's nonce is handed over exactly once as a
//! [`Nonce`] value.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use notarius_artifact::SignatureArtifact;
use serde::{Deserialize, Deserializer, Serialize};

use crate::chain::TrustChainValidator;
use crate::config::TrustConfig;
use crate::error::VerificationError;
use crate::ltv::{LtvReport, LtvVerifier};
use crate::signature::{IdentityProviderKey, JwsAlgorithm, TokenSignatureVerifier, URL_SAFE_LENIENT};

/// Decoded JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signature algorithm name.
    pub alg: String,
    /// Key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Media type, usually `JWT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A compact JWS split into its parts.
#[derive(Debug, Clone)]
pub struct CompactJws {
    /// Decoded header.
    pub header: JwsHeader,
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
    signing_input: String,
    signature: Vec<u8>,
}

impl CompactJws {
    /// Split and decode a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedToken`] if the token is not
    /// three base64url segments with a JSON header.
    pub fn parse(token: &[u8]) -> Result<Self, VerificationError> {
        let token = std::str::from_utf8(token)
            .map_err(|_| malformed("token is not UTF-8"))?
            .trim();

        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected three dot-separated segments"));
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(malformed("empty token segment"));
        }

        let header_bytes = URL_SAFE_LENIENT
            .decode(header)
            .map_err(|e| malformed(format!("header is not base64url: {e}")))?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| malformed(format!("header is not valid JSON: {e}")))?;
        let payload_bytes = URL_SAFE_LENIENT
            .decode(payload)
            .map_err(|e| malformed(format!("payload is not base64url: {e}")))?;
        let signature_bytes = URL_SAFE_LENIENT
            .decode(signature)
            .map_err(|e| malformed(format!("signature is not base64url: {e}")))?;

        // The signing input is everything before the last dot, verbatim.
        let signing_input = token
            .rsplit_once('.')
            .map(|(input, _)| input.to_owned())
            .unwrap_or_default();

        Ok(Self {
            header,
            payload: payload_bytes,
            signing_input,
            signature: signature_bytes,
        })
    }

    /// The header algorithm, if supported.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedToken`] for `none` or any
    /// algorithm outside the supported set.
    pub fn algorithm(&self) -> Result<JwsAlgorithm, VerificationError> {
        self.header.alg.parse().map_err(malformed)
    }

    /// Decode the payload as identity claims.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedToken`] if required claims are
    /// missing or mistyped.
    pub fn claims(&self) -> Result<IdentityClaims, VerificationError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| malformed(format!("invalid claims: {e}")))
    }
}

fn malformed(reason: impl Into<String>) -> VerificationError {
    VerificationError::MalformedToken(reason.into())
}

/// `aud` is either one string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    One(String),
    /// Several audiences.
    Many(Vec<String>),
}

impl Audience {
    /// Whether `client_id` is among the audiences.
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == client_id,
            Self::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }

    fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(aud) => vec![aud.clone()],
            Self::Many(auds) => auds.clone(),
        }
    }
}

/// Claims of an identity token that verification looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: Audience,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Issuance, unix seconds.
    pub iat: i64,
    /// Not-before, unix seconds.
    #[serde(default)]
    pub nbf: Option<i64>,
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Signer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the provider verified the email.
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: bool,
    /// The nonce, which carries the signed document hash.
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Some providers send `"email_verified": "true"`.
fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => flag,
        Flag::Text(text) => text.eq_ignore_ascii_case("true"),
    })
}

/// The token nonce.
///
/// Not `Clone`: it is produced once per verification and consumed once by
/// [`crate::binding::bind`].
pub struct Nonce(String);

impl Nonce {
    /// The nonce text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the nonce.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Nonce").field(&self.0).finish()
    }
}

/// Claims that survived verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// Verified signer email.
    pub email: String,
    /// Token subject.
    pub subject: Option<String>,
    /// Token issuance time, the signature timestamp.
    pub issued_at: DateTime<Utc>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Id of the signing key.
    pub key_id: Option<String>,
    /// Present when long-term validation ran and passed.
    pub long_term: Option<LtvReport>,
}

/// Outcome of a successful token verification.
#[derive(Debug)]
pub struct TokenVerification {
    /// The verified claims.
    pub claims: VerifiedClaims,
    /// The nonce, to be bound to the document hash.
    pub nonce: Nonce,
}

/// Verifies the identity token of one artifact.
#[derive(Debug)]
pub struct IdentityTokenVerifier<'c, C> {
    config: &'c TrustConfig,
    chain_validator: &'c C,
}

impl<'c, C: TrustChainValidator> IdentityTokenVerifier<'c, C> {
    /// Create a verifier for one call.
    pub fn new(config: &'c TrustConfig, chain_validator: &'c C) -> Self {
        Self {
            config,
            chain_validator,
        }
    }

    /// Verify the token in `artifact` as of `at`.
    ///
    /// With `long_term`, the key's chain must also be backed by revocation
    /// evidence; LTV failures are wrapped in
    /// [`VerificationError::LongTermValidation`].
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn verify(
        &self,
        artifact: &SignatureArtifact,
        at: DateTime<Utc>,
        long_term: bool,
    ) -> Result<TokenVerification, VerificationError> {
        let key = IdentityProviderKey::from_jwk(&artifact.identity_provider_key)?;
        let jws = CompactJws::parse(&artifact.identity_token)?;
        let algorithm = jws.algorithm()?;

        key.verify_token_signature(algorithm, jws.signing_input.as_bytes(), &jws.signature)?;
        tracing::debug!(%algorithm, kid = ?key.kid, "token signature verified");

        let claims = jws.claims()?;

        if claims.iss != self.config.issuer {
            return Err(VerificationError::IssuerMismatch {
                expected: self.config.issuer.clone(),
                actual: claims.iss,
            });
        }
        if !claims.aud.contains(&self.config.client_id) {
            return Err(VerificationError::AudienceMismatch {
                expected: self.config.client_id.clone(),
                actual: claims.aud.to_vec(),
            });
        }

        let (issued_at, expires_at) = check_validity(&claims, at, self.config.leeway)?;

        let email = match (claims.email, claims.email_verified) {
            (Some(email), true) => email,
            (Some(email), false) => return Err(VerificationError::EmailNotVerified(email)),
            (None, _) => {
                return Err(VerificationError::EmailNotVerified(
                    "token carries no email claim".to_owned(),
                ));
            }
        };
        tracing::debug!(%email, "token claims verified");

        let leaf = key.leaf().ok_or_else(|| {
            VerificationError::UntrustedChain(
                "identity provider key carries no certificate chain".to_owned(),
            )
        })?;
        if !key.material.matches_spki(leaf.spki()) {
            return Err(VerificationError::UntrustedChain(format!(
                "identity provider key does not match leaf certificate `{}`",
                leaf.subject()
            )));
        }
        let validated =
            self.chain_validator
                .validate_chain(&key.chain, &self.config.trust_roots, at)?;

        let long_term = if long_term {
            let report = LtvVerifier
                .verify(&validated, &artifact.revocation_evidence, at)
                .map_err(|e| VerificationError::LongTermValidation(Box::new(e)))?;
            Some(report)
        } else {
            None
        };

        Ok(TokenVerification {
            claims: VerifiedClaims {
                email,
                subject: claims.sub,
                issued_at,
                expires_at,
                key_id: key.kid,
                long_term,
            },
            // An absent nonce binds no hash: `binding::bind` rejects it as empty.
            nonce: Nonce(claims.nonce.unwrap_or_default()),
        })
    }
}

fn timestamp(name: &str, secs: i64) -> Result<DateTime<Utc>, VerificationError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| malformed(format!("`{name}` {secs} is out of range")))
}

fn saturating_add(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returns `(iat, exp)` when `at` lies inside the token's window.
///
/// `leeway` only widens the start of the window.
fn check_validity(
    claims: &IdentityClaims,
    at: DateTime<Utc>,
    leeway: TimeDelta,
) -> Result<(DateTime<Utc>, DateTime<Utc>), VerificationError> {
    let issued_at = timestamp("iat", claims.iat)?;
    let expires_at = timestamp("exp", claims.exp)?;
    let late_bound = saturating_add(at, leeway);

    if at > expires_at {
        return Err(VerificationError::Expired(format!(
            "expired at {}, reference time {}",
            expires_at.to_rfc3339(),
            at.to_rfc3339()
        )));
    }
    if let Some(nbf) = claims.nbf {
        let not_before = timestamp("nbf", nbf)?;
        if late_bound < not_before {
            return Err(VerificationError::Expired(format!(
                "not valid before {}, reference time {}",
                not_before.to_rfc3339(),
                at.to_rfc3339()
            )));
        }
    }
    if late_bound < issued_at {
        return Err(VerificationError::Expired(format!(
            "issued at {}, after the reference time {}",
            issued_at.to_rfc3339(),
            at.to_rfc3339()
        )));
    }
    Ok((issued_at, expires_at))
}
