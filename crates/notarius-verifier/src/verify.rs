//! Verification orchestration.
//!
//! [`Verifier`] samples the reference clock once, runs the identity token
//! verifier (which in turn consults the chain validator and, when
//! requested, the LTV verifier), then binds the nonce to the target hash.
//! The first failure stops the pipeline and becomes the verdict.

use chrono::{DateTime, Utc};
use notarius_artifact::SignatureArtifact;
use serde::Serialize;

use crate::binding::{self, BoundSignature, SignatureLevel};
use crate::chain::{PathValidator, TrustChainValidator};
use crate::config::{LtvMode, TrustConfig};
use crate::error::{ErrorClass, ErrorKind, VerificationError};
use crate::token::IdentityTokenVerifier;

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Force long-term validation on (`Some(true)`) or ask to skip it
    /// (`Some(false)`, ignored under [`LtvMode::Required`]). `None` follows
    /// the configured mode.
    pub long_term: Option<bool>,
}

/// The outcome of one verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationVerdict {
    /// Whether every check passed.
    pub valid: bool,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    /// Verified signer email.
    pub signer_email: Option<String>,
    /// Assurance level.
    pub signature_level: Option<SignatureLevel>,
    /// Token issuance time.
    pub signature_time: Option<DateTime<Utc>>,
}

impl VerificationVerdict {
    /// A passing verdict.
    pub fn success(signature: BoundSignature) -> Self {
        Self {
            valid: true,
            error: None,
            error_kind: None,
            error_class: None,
            signer_email: Some(signature.signer_email),
            signature_level: Some(signature.level),
            signature_time: Some(signature.signature_time),
        }
    }

    /// A failing verdict. Never carries claim data.
    pub fn failure(err: &VerificationError) -> Self {
        Self {
            valid: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            error_class: Some(err.class()),
            signer_email: None,
            signature_level: None,
            signature_time: None,
        }
    }
}

/// Verifies signature artifacts against one trust configuration.
///
/// Shareable across threads; calls do not interact.
#[derive(Debug, Clone)]
pub struct Verifier<C = PathValidator> {
    config: TrustConfig,
    chain_validator: C,
}

impl Verifier<PathValidator> {
    /// A verifier with the standard path validator.
    pub fn new(config: TrustConfig) -> Self {
        Self::with_chain_validator(config, PathValidator)
    }
}

impl<C: TrustChainValidator> Verifier<C> {
    /// A verifier with a custom chain validator.
    pub fn with_chain_validator(config: TrustConfig, chain_validator: C) -> Self {
        Self {
            config,
            chain_validator,
        }
    }

    /// The trust configuration in use.
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Verify `artifact` against `target_hash`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn try_verify(
        &self,
        artifact: &SignatureArtifact,
        target_hash: &str,
        options: VerifyOptions,
    ) -> Result<BoundSignature, VerificationError> {
        let at = self.config.clock.now();
        let long_term = self.long_term_requested(artifact, options);
        tracing::debug!(
            reference_time = %at.to_rfc3339(),
            long_term,
            evidence = artifact.revocation_evidence.len(),
            "verifying signature"
        );

        let verification = IdentityTokenVerifier::new(&self.config, &self.chain_validator)
            .verify(artifact, at, long_term)?;
        binding::bind(verification, target_hash)
    }

    /// Verify `artifact` against `target_hash` and fold the outcome into a
    /// verdict.
    pub fn verify(
        &self,
        artifact: &SignatureArtifact,
        target_hash: &str,
        options: VerifyOptions,
    ) -> VerificationVerdict {
        match self.try_verify(artifact, target_hash, options) {
            Ok(signature) => {
                tracing::info!(
                    signer = %signature.signer_email,
                    level = ?signature.level,
                    "signature valid"
                );
                VerificationVerdict::success(signature)
            }
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), class = ?err.class(), error = %err, "signature invalid");
                VerificationVerdict::failure(&err)
            }
        }
    }

    fn long_term_requested(&self, artifact: &SignatureArtifact, options: VerifyOptions) -> bool {
        match (options.long_term, self.config.ltv_mode) {
            (Some(true), _) | (_, LtvMode::Required) => true,
            (Some(false), _) | (None, LtvMode::Disabled) => false,
            (None, LtvMode::WhenPresent) => !artifact.revocation_evidence.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::binding::sha256_hex;
    use crate::chain::{ParsedCertificate, ValidatedChain};
    use crate::config::TrustRoots;
    use crate::fixtures::{EMAIL, Fixture};

    fn doc_hash() -> String {
        sha256_hex(b"doc-A")
    }

    #[test]
    fn basic_signature_without_evidence() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact_with(
            fixture.token(&fixture.claims(&doc_hash())).into_bytes(),
            fixture.jwk(),
            BTreeMap::new(),
        );
        let verdict =
            Verifier::new(fixture.trust_config()).verify(&artifact, &doc_hash(), VerifyOptions::default());

        assert!(verdict.valid, "verdict: {verdict:?}");
        assert_eq!(verdict.signer_email.as_deref(), Some(EMAIL));
        assert_eq!(verdict.signature_level, Some(SignatureLevel::Basic));
        assert_eq!(verdict.signature_time, Some(fixture.signing_time()));
    }

    #[test]
    fn long_term_signature_with_evidence() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let verdict =
            Verifier::new(fixture.trust_config()).verify(&artifact, &doc_hash(), VerifyOptions::default());

        assert!(verdict.valid, "verdict: {verdict:?}");
        assert_eq!(verdict.signature_level, Some(SignatureLevel::LongTerm));
    }

    #[test]
    fn historical_reference_time_outlives_expiry() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());

        // The fixture token and leaf certificate expired long before now.
        let today = fixture
            .trust_config()
            .with_clock(crate::config::ReferenceClock::wall_clock());
        let verdict = Verifier::new(today).verify(&artifact, &doc_hash(), VerifyOptions::default());
        assert!(!verdict.valid);
        assert_eq!(verdict.error_kind, Some(ErrorKind::Expired));

        let verdict = Verifier::new(fixture.trust_config()).verify(
            &artifact,
            &doc_hash(),
            VerifyOptions::default(),
        );
        assert!(verdict.valid, "verdict: {verdict:?}");
    }

    #[test]
    fn trusting_intermediate_keeps_full_chain_valid() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact_with(
            fixture.token(&fixture.claims(&doc_hash())).into_bytes(),
            fixture.jwk_with_chain(&[
                fixture.leaf_certificate(),
                fixture.intermediate_certificate(),
                fixture.root_certificate(),
            ]),
            fixture.ltv_evidence(),
        );

        for config in [
            fixture.trust_config(),
            fixture
                .trust_config()
                .with_additional_roots([fixture.intermediate_certificate()]),
        ] {
            let verdict = Verifier::new(config).verify(&artifact, &doc_hash(), VerifyOptions::default());
            assert!(verdict.valid, "verdict: {verdict:?}");
            assert_eq!(verdict.signature_level, Some(SignatureLevel::LongTerm));
        }
    }

    #[test]
    fn token_without_nonce_is_hash_mismatch() {
        let fixture = Fixture::new();
        let mut claims = fixture.claims(&doc_hash());
        claims.as_object_mut().expect("claims object").remove("nonce");
        let artifact = fixture.artifact_with(
            fixture.token(&claims).into_bytes(),
            fixture.jwk(),
            fixture.ltv_evidence(),
        );
        let verifier = Verifier::new(fixture.trust_config());

        for target in [doc_hash(), String::new()] {
            let verdict = verifier.verify(&artifact, &target, VerifyOptions::default());
            assert!(!verdict.valid);
            assert_eq!(verdict.error_kind, Some(ErrorKind::HashMismatch));
        }
    }

    #[test]
    fn other_document_is_hash_mismatch() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let verdict = Verifier::new(fixture.trust_config()).verify(
            &artifact,
            &sha256_hex(b"doc-B"),
            VerifyOptions::default(),
        );

        assert!(!verdict.valid);
        assert_eq!(verdict.error_kind, Some(ErrorKind::HashMismatch));
        assert_eq!(verdict.error_class, Some(ErrorClass::Binding));
        assert!(verdict.signer_email.is_none());
        assert!(verdict.signature_level.is_none());
        assert!(verdict.signature_time.is_none());
    }

    #[test]
    fn disabled_mode_ignores_evidence() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let config = fixture.trust_config().with_ltv_mode(LtvMode::Disabled);
        let verdict = Verifier::new(config).verify(&artifact, &doc_hash(), VerifyOptions::default());
        assert_eq!(verdict.signature_level, Some(SignatureLevel::Basic));
    }

    #[test]
    fn request_can_force_ltv() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact_with(
            fixture.token(&fixture.claims(&doc_hash())).into_bytes(),
            fixture.jwk(),
            BTreeMap::new(),
        );
        let config = fixture.trust_config().with_ltv_mode(LtvMode::Disabled);
        let verdict = Verifier::new(config).verify(
            &artifact,
            &doc_hash(),
            VerifyOptions {
                long_term: Some(true),
            },
        );
        assert!(!verdict.valid);
        assert_eq!(verdict.error_kind, Some(ErrorKind::MissingLtvData));
    }

    #[test]
    fn required_mode_cannot_be_skipped() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact_with(
            fixture.token(&fixture.claims(&doc_hash())).into_bytes(),
            fixture.jwk(),
            BTreeMap::new(),
        );
        let config = fixture.trust_config().with_ltv_mode(LtvMode::Required);
        let verdict = Verifier::new(config).verify(
            &artifact,
            &doc_hash(),
            VerifyOptions {
                long_term: Some(false),
            },
        );
        assert_eq!(verdict.error_kind, Some(ErrorKind::MissingLtvData));
    }

    #[test]
    fn verification_is_idempotent() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let verifier = Verifier::new(fixture.trust_config());
        let first = verifier.verify(&artifact, &doc_hash(), VerifyOptions::default());
        let second = verifier.verify(&artifact, &doc_hash(), VerifyOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn verdict_serializes_snake_case() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let verdict =
            Verifier::new(fixture.trust_config()).verify(&artifact, &doc_hash(), VerifyOptions::default());
        let value = serde_json::to_value(&verdict).expect("serialize");
        assert_eq!(value["signature_level"], json!("long_term"));
        assert_eq!(value["signature_time"], json!("2023-06-01T12:00:00Z"));
        assert!(value.get("error").is_none());
    }

    /// A validator that trusts nothing, standing in for a stricter policy.
    struct DenyAll;

    impl TrustChainValidator for DenyAll {
        fn validate_chain<'a>(
            &self,
            _chain: &'a [ParsedCertificate],
            _roots: &'a TrustRoots,
            _at: DateTime<Utc>,
        ) -> Result<ValidatedChain<'a>, VerificationError> {
            Err(VerificationError::UntrustedChain("denied".to_owned()))
        }
    }

    #[test]
    fn custom_chain_validator_is_consulted() {
        let fixture = Fixture::new();
        let artifact = fixture.artifact(&doc_hash());
        let verdict = Verifier::with_chain_validator(fixture.trust_config(), DenyAll).verify(
            &artifact,
            &doc_hash(),
            VerifyOptions::default(),
        );
        assert_eq!(verdict.error_kind, Some(ErrorKind::UntrustedChain));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const SIGNATURE: u8 = 1 << 0;
        const ISSUER: u8 = 1 << 1;
        const AUDIENCE: u8 = 1 << 2;
        const EXPIRY: u8 = 1 << 3;
        const EMAIL_FLAG: u8 = 1 << 4;
        const CHAIN: u8 = 1 << 5;
        const LTV: u8 = 1 << 6;
        const HASH: u8 = 1 << 7;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            /// Only the combination where every check passes is valid.
            #[test]
            fn any_failed_check_fails_the_verdict(broken in any::<u8>()) {
                let fixture = Fixture::shared();
                let mut claims = fixture.claims(&doc_hash());
                if broken & ISSUER != 0 {
                    claims["iss"] = json!("https://evil.example.com");
                }
                if broken & AUDIENCE != 0 {
                    claims["aud"] = json!("someone-else");
                }
                if broken & EXPIRY != 0 {
                    claims["exp"] = json!(fixture.reference_time().timestamp() - 3600);
                }
                if broken & EMAIL_FLAG != 0 {
                    claims["email_verified"] = json!(false);
                }

                let mut token = fixture.token(&claims);
                if broken & SIGNATURE != 0 {
                    token = fixture.tamper_signature(&token);
                }
                let jwk = if broken & CHAIN != 0 {
                    fixture.jwk_with_chain(&[fixture.leaf_certificate()])
                } else {
                    fixture.jwk()
                };
                let mut evidence = fixture.ltv_evidence();
                if broken & LTV != 0 {
                    evidence.remove(fixture.leaf_certificate().id());
                }
                let target = if broken & HASH != 0 {
                    sha256_hex(b"doc-B")
                } else {
                    doc_hash()
                };

                let artifact = fixture.artifact_with(token.into_bytes(), jwk, evidence);
                let verdict = Verifier::new(fixture.trust_config()).verify(
                    &artifact,
                    &target,
                    VerifyOptions { long_term: Some(true) },
                );

                prop_assert_eq!(verdict.valid, broken == 0, "verdict: {:?}", verdict);
                if broken != 0 {
                    prop_assert!(verdict.error_kind.is_some());
                    prop_assert!(verdict.signer_email.is_none());
                }
            }
        }
    }
}
