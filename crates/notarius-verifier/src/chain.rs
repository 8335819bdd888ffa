//! Certificate path validation for the identity provider key.
//!
//! The JWK's `x5c` chain must lead, certificate by certificate, to one of
//! the configured trust roots, with every certificate valid at the
//! reference time rather than now. Expired provider certificates are
//! therefore fine as long as they were valid when the token was checked.

use chrono::{DateTime, Utc};
use notarius_artifact::certificate_id;
use x509_cert::Certificate;
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Time;

use crate::config::TrustRoots;
use crate::error::VerificationError;
use crate::signature;

/// A decoded X.509 certificate that keeps its original DER.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    der: Vec<u8>,
    certificate: Certificate,
    id: String,
}

impl ParsedCertificate {
    /// Decode a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns the DER error if `der` is not a certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self, x509_cert::der::Error> {
        let certificate = Certificate::from_der(&der)?;
        let id = certificate_id(&der);
        Ok(Self {
            der,
            certificate,
            id,
        })
    }

    /// The original DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The decoded certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Id under which revocation evidence for this certificate is filed.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> String {
        self.certificate.tbs_certificate.issuer.to_string()
    }

    /// Start of the validity period.
    pub fn not_before(&self) -> DateTime<Utc> {
        to_datetime(&self.certificate.tbs_certificate.validity.not_before)
    }

    /// End of the validity period.
    pub fn not_after(&self) -> DateTime<Utc> {
        to_datetime(&self.certificate.tbs_certificate.validity.not_after)
    }

    /// Whether `at` falls inside the validity period (inclusive).
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before() <= at && at <= self.not_after()
    }

    /// The subject public key.
    pub fn spki(&self) -> &SubjectPublicKeyInfoOwned {
        &self.certificate.tbs_certificate.subject_public_key_info
    }

    /// The basic constraints extension, if present and decodable.
    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.certificate
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == BasicConstraints::OID)
            .and_then(|ext| BasicConstraints::from_der(ext.extn_value.as_bytes()).ok())
    }

    /// Whether the certificate may issue other certificates.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints().is_some_and(|bc| bc.ca)
    }

    /// Whether `issuer` issued this certificate: the names link up and the
    /// signature verifies under the issuer's key.
    pub fn is_issued_by(&self, issuer: &Self) -> bool {
        let tbs = &self.certificate.tbs_certificate;
        if tbs.issuer != issuer.certificate.tbs_certificate.subject {
            return false;
        }
        // The algorithm inside the signed part must agree with the outer one.
        if tbs.signature != self.certificate.signature_algorithm {
            return false;
        }
        let Ok(tbs_der) = tbs.to_der() else {
            return false;
        };
        let Some(sig) = self.certificate.signature.as_bytes() else {
            return false;
        };
        signature::verify_x509_signature(
            &self.certificate.signature_algorithm.oid,
            issuer.spki(),
            &tbs_der,
            sig,
        )
        .is_ok()
    }
}

impl PartialEq for ParsedCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for ParsedCertificate {}

fn to_datetime(time: &Time) -> DateTime<Utc> {
    let secs = i64::try_from(time.to_unix_duration().as_secs()).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A certificate in a validated chain together with the certificate that
/// issued it.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink<'a> {
    /// The issued certificate.
    pub certificate: &'a ParsedCertificate,
    /// Its issuer, either the next chain entry or a trust root.
    pub issuer: &'a ParsedCertificate,
}

/// Result of a successful path validation.
#[derive(Debug, Clone)]
pub struct ValidatedChain<'a> {
    links: Vec<ChainLink<'a>>,
    anchor: &'a ParsedCertificate,
}

impl<'a> ValidatedChain<'a> {
    /// Certificates that need revocation evidence: every certificate
    /// except the trust anchor, leaf first.
    pub fn links(&self) -> &[ChainLink<'a>] {
        &self.links
    }

    /// The trust root the chain ends at.
    pub fn anchor(&self) -> &'a ParsedCertificate {
        self.anchor
    }
}

/// Decides whether a certificate chain leads to a trusted root.
pub trait TrustChainValidator {
    /// Validate `chain` (leaf first) against `roots` at time `at`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::UntrustedChain`] if no valid path to a
    /// trust root exists.
    fn validate_chain<'a>(
        &self,
        chain: &'a [ParsedCertificate],
        roots: &'a TrustRoots,
        at: DateTime<Utc>,
    ) -> Result<ValidatedChain<'a>, VerificationError>;
}

/// Strict path validator: every certificate must be issued by the next
/// until the first trusted certificate, or the last one must be issued by a
/// trust root. Certificates after a trusted one are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathValidator;

impl TrustChainValidator for PathValidator {
    fn validate_chain<'a>(
        &self,
        chain: &'a [ParsedCertificate],
        roots: &'a TrustRoots,
        at: DateTime<Utc>,
    ) -> Result<ValidatedChain<'a>, VerificationError> {
        if chain.is_empty() {
            return Err(untrusted("identity provider key carries no certificate chain"));
        }
        if roots.is_empty() {
            return Err(untrusted("no trust roots configured"));
        }

        let mut links = Vec::with_capacity(chain.len());

        for (index, certificate) in chain.iter().enumerate() {
            if let Some(anchor) = roots.find(certificate) {
                if index == 0 {
                    return Err(untrusted("identity provider key is itself a trust root"));
                }
                if index + 1 != chain.len() {
                    tracing::debug!(
                        anchor = %anchor.subject(),
                        ignored = chain.len() - index - 1,
                        "ignoring certificates above trust anchor"
                    );
                }
                check_validity(anchor, at)?;
                return Ok(ValidatedChain { links, anchor });
            }

            check_validity(certificate, at)?;
            if index > 0 {
                check_can_issue(certificate, index - 1)?;
            }

            if let Some(issuer) = chain.get(index + 1) {
                if !certificate.is_issued_by(issuer) {
                    return Err(untrusted(format!(
                        "`{}` is not issued by `{}`",
                        certificate.subject(),
                        issuer.subject()
                    )));
                }
                links.push(ChainLink {
                    certificate,
                    issuer,
                });
            } else {
                let anchor = roots
                    .iter()
                    .find(|root| certificate.is_issued_by(root))
                    .ok_or_else(|| {
                        untrusted(format!(
                            "`{}` (issuer `{}`) does not chain to a trusted root",
                            certificate.subject(),
                            certificate.issuer()
                        ))
                    })?;
                check_validity(anchor, at)?;
                links.push(ChainLink {
                    certificate,
                    issuer: anchor,
                });
                tracing::debug!(
                    depth = links.len(),
                    anchor = %anchor.subject(),
                    "certificate chain validated"
                );
                return Ok(ValidatedChain { links, anchor });
            }
        }

        Err(untrusted("chain does not end at a trusted root"))
    }
}

fn untrusted(reason: impl Into<String>) -> VerificationError {
    VerificationError::UntrustedChain(reason.into())
}

fn check_validity(certificate: &ParsedCertificate, at: DateTime<Utc>) -> Result<(), VerificationError> {
    if certificate.is_valid_at(at) {
        Ok(())
    } else {
        Err(untrusted(format!(
            "`{}` is not valid at {} (valid from {} to {})",
            certificate.subject(),
            at.to_rfc3339(),
            certificate.not_before().to_rfc3339(),
            certificate.not_after().to_rfc3339()
        )))
    }
}

/// `intermediates_below` is the number of CA certificates between this one
/// and the leaf.
fn check_can_issue(
    certificate: &ParsedCertificate,
    intermediates_below: usize,
) -> Result<(), VerificationError> {
    let Some(constraints) = certificate.basic_constraints().filter(|bc| bc.ca) else {
        return Err(untrusted(format!(
            "`{}` is not a certificate authority",
            certificate.subject()
        )));
    };
    if let Some(limit) = constraints.path_len_constraint {
        if intermediates_below > usize::from(limit) {
            return Err(untrusted(format!(
                "`{}` allows a path length of {limit}, found {intermediates_below}",
                certificate.subject()
            )));
        }
    }
    Ok(())
}
