//! Long-term validation of the identity provider's certificate chain.
//!
//! Each certificate below the trust anchor needs a revocation proof that
//! its own issuer signed, produced between the certificate's `notBefore`
//! and the reference time, asserting the certificate was good. One bad
//! certificate fails the whole check.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use notarius_artifact::{LtvRecord, RevocationStatus};
use x509_cert::der::Encode;

use crate::chain::{ChainLink, ValidatedChain};
use crate::error::VerificationError;
use crate::signature;

/// Summary of a passed long-term validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LtvReport {
    /// Ids of the certificates whose proofs were checked, leaf first.
    pub certificates_checked: Vec<String>,
}

/// Checks revocation evidence for a validated chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LtvVerifier;

impl LtvVerifier {
    /// Check that every certificate in `chain` below the anchor has a
    /// valid, good proof in `evidence` at time `at`.
    ///
    /// # Errors
    ///
    /// Returns the first failure in chain order: `MissingLtvData`,
    /// `UntrustedProof`, `StaleProof`, or `Revoked`.
    pub fn verify(
        &self,
        chain: &ValidatedChain<'_>,
        evidence: &BTreeMap<String, LtvRecord>,
        at: DateTime<Utc>,
    ) -> Result<LtvReport, VerificationError> {
        let mut certificates_checked = Vec::with_capacity(chain.links().len());

        for link in chain.links() {
            let id = link.certificate.id();
            let record = evidence
                .get(id)
                .ok_or_else(|| VerificationError::MissingLtvData {
                    certificate_id: id.to_owned(),
                    subject: link.certificate.subject(),
                })?;

            verify_record(link, record, at).inspect_err(|err| {
                tracing::warn!(
                    certificate_id = id,
                    subject = %link.certificate.subject(),
                    kind = ?err.kind(),
                    "LTV proof rejected"
                );
            })?;

            tracing::debug!(
                certificate_id = id,
                produced_at = %record.produced_at.to_rfc3339(),
                "LTV proof accepted"
            );
            certificates_checked.push(id.to_owned());
        }

        Ok(LtvReport {
            certificates_checked,
        })
    }
}

fn verify_record(
    link: &ChainLink<'_>,
    record: &LtvRecord,
    at: DateTime<Utc>,
) -> Result<(), VerificationError> {
    let id = link.certificate.id();
    let untrusted = |reason: String| VerificationError::UntrustedProof {
        certificate_id: id.to_owned(),
        reason,
    };

    if record.certificate_id != id {
        return Err(untrusted(format!(
            "proof covers certificate {}",
            record.certificate_id
        )));
    }

    let issuer_name = link
        .issuer
        .certificate()
        .tbs_certificate
        .subject
        .to_der()
        .map_err(|e| untrusted(format!("could not encode issuer name: {e}")))?;
    if record.signer != issuer_name {
        return Err(untrusted(format!(
            "proof signer is not the certificate issuer `{}`",
            link.issuer.subject()
        )));
    }

    signature::verify_with_issuer_key(
        link.issuer.spki(),
        &record.unsigned_canonical_bytes(),
        &record.signature,
    )
    .map_err(|reason| untrusted(format!("proof signature: {reason}")))?;

    let issued = link.certificate.not_before();
    if record.produced_at < issued {
        return Err(VerificationError::StaleProof {
            certificate_id: id.to_owned(),
            reason: format!(
                "produced at {} before the certificate was issued at {}",
                record.produced_at.to_rfc3339(),
                issued.to_rfc3339()
            ),
        });
    }
    if record.produced_at > at {
        return Err(VerificationError::StaleProof {
            certificate_id: id.to_owned(),
            reason: format!(
                "produced at {} after the reference time {}",
                record.produced_at.to_rfc3339(),
                at.to_rfc3339()
            ),
        });
    }

    match record.status {
        RevocationStatus::Good => Ok(()),
        RevocationStatus::Revoked => Err(VerificationError::Revoked {
            certificate_id: id.to_owned(),
            subject: link.certificate.subject(),
        }),
        RevocationStatus::Unknown => Err(untrusted(
            "proof does not assert a revocation status".to_owned(),
        )),
    }
}
