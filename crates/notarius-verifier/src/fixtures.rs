//! Throwaway PKI and signed artifacts for tests.
//!
//! Every [`Fixture`] generates fresh ECDSA P-256 keys for a root, an
//! intermediate and a leaf, issues real certificates for them, and signs
//! identity tokens and LTV records with those keys. Nothing here is mocked:
//! the verifier under test runs the same cryptography it runs in
//! production.
//!
//! Times are fixed so that the leaf certificate has expired by now but was
//! valid at [`Fixture::reference_time`].

#![allow(
    clippy::missing_panics_doc,
    clippy::unused_self,
    reason = "test fixtures panic on setup failure and keep a uniform method API"
)]

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair,
};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use notarius_artifact::pem::der_to_pem;
use notarius_artifact::{LtvRecord, RevocationStatus, SignatureArtifact};
use serde_json::json;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::der::asn1::{Any, BitString, OctetString, UtcTime};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::Encode;
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};

use crate::chain::ParsedCertificate;
use crate::config::{ReferenceClock, TrustConfig, TrustRoots};

/// Issuer the fixture tokens claim.
pub const ISSUER: &str = "https://accounts.notarius.test";
/// Audience the fixture tokens claim.
pub const CLIENT_ID: &str = "notarius-test-client";
/// Verified email the fixture tokens carry.
pub const EMAIL: &str = "signer@notarius.test";
/// `kid` of the fixture JWK.
pub const KEY_ID: &str = "leaf-key";

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// A certificate authority with its signing key.
struct Authority {
    pkcs8: Vec<u8>,
    name: Name,
    certificate: ParsedCertificate,
}

impl Authority {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_asn1(&self.pkcs8, message)
    }
}

struct CertificateTemplate<'a> {
    serial: u8,
    subject: &'a Name,
    public_key: &'a [u8],
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    ca: bool,
}

/// Root → intermediate → leaf PKI plus helpers to sign artifacts with it.
pub struct Fixture {
    root: Authority,
    intermediate: Authority,
    leaf_pkcs8: Vec<u8>,
    leaf_point: Vec<u8>,
    leaf: ParsedCertificate,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Generate a fresh PKI.
    pub fn new() -> Self {
        let root_name = Name::from_str("CN=Notarius Test Root").expect("root name");
        let (root_pkcs8, root_point) = generate_key();
        let root_certificate = issue(
            &CertificateTemplate {
                serial: 1,
                subject: &root_name,
                public_key: &root_point,
                not_before: date(2020, 1, 1),
                not_after: date(2040, 1, 1),
                ca: true,
            },
            &root_name,
            &root_pkcs8,
        );
        let root = Authority {
            pkcs8: root_pkcs8,
            name: root_name,
            certificate: root_certificate,
        };

        let intermediate_name =
            Name::from_str("CN=Notarius Test Intermediate").expect("intermediate name");
        let (intermediate_pkcs8, intermediate_point) = generate_key();
        let intermediate_certificate = issue(
            &CertificateTemplate {
                serial: 2,
                subject: &intermediate_name,
                public_key: &intermediate_point,
                not_before: date(2020, 1, 1),
                not_after: date(2035, 1, 1),
                ca: true,
            },
            &root.name,
            &root.pkcs8,
        );
        let intermediate = Authority {
            pkcs8: intermediate_pkcs8,
            name: intermediate_name,
            certificate: intermediate_certificate,
        };

        let leaf_name = Name::from_str("CN=Notarius Test Leaf").expect("leaf name");
        let (leaf_pkcs8, leaf_point) = generate_key();
        let leaf = issue(
            &CertificateTemplate {
                serial: 3,
                subject: &leaf_name,
                public_key: &leaf_point,
                not_before: date(2021, 1, 1),
                not_after: date(2024, 1, 1),
                ca: false,
            },
            &intermediate.name,
            &intermediate.pkcs8,
        );

        Self {
            root,
            intermediate,
            leaf_pkcs8,
            leaf_point,
            leaf,
        }
    }

    /// A process-wide fixture for property tests, where generating keys per
    /// case would dominate the run time.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<Fixture> = OnceLock::new();
        SHARED.get_or_init(Self::new)
    }

    /// When the fixture tokens are issued.
    pub fn signing_time(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    /// The instant verification is evaluated at: one minute after signing.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.signing_time() + TimeDelta::seconds(60)
    }

    /// When the fixture LTV records are produced.
    pub fn proof_time(&self) -> DateTime<Utc> {
        self.signing_time() + TimeDelta::seconds(30)
    }

    /// The root certificate.
    pub fn root_certificate(&self) -> ParsedCertificate {
        self.root.certificate.clone()
    }

    /// The intermediate certificate.
    pub fn intermediate_certificate(&self) -> ParsedCertificate {
        self.intermediate.certificate.clone()
    }

    /// The leaf certificate, whose key signs tokens.
    pub fn leaf_certificate(&self) -> ParsedCertificate {
        self.leaf.clone()
    }

    /// The root certificate as PEM.
    pub fn root_pem(&self) -> String {
        der_to_pem(self.root.certificate.der(), "CERTIFICATE")
    }

    /// DER encoding of the root's distinguished name.
    pub fn root_name_der(&self) -> Vec<u8> {
        self.root.name.to_der().expect("encode root name")
    }

    /// Trust roots holding only this fixture's root.
    pub fn trust_roots(&self) -> TrustRoots {
        TrustRoots::new(vec![self.root_certificate()])
    }

    /// A configuration matching the fixture tokens, with the clock fixed at
    /// [`Fixture::reference_time`].
    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig::new(ISSUER, CLIENT_ID, self.trust_roots())
            .with_clock(ReferenceClock::fixed(self.reference_time()))
    }

    /// Valid claims carrying `nonce`.
    pub fn claims(&self, nonce: &str) -> serde_json::Value {
        let iat = self.signing_time().timestamp();
        json!({
            "iss": ISSUER,
            "aud": CLIENT_ID,
            "sub": "108512345678901234567",
            "email": EMAIL,
            "email_verified": true,
            "iat": iat,
            "exp": iat + 300,
            "nonce": nonce,
        })
    }

    /// An ES256 compact JWS over `claims`, signed with the leaf key.
    pub fn token(&self, claims: &serde_json::Value) -> String {
        let header = json!({ "alg": "ES256", "typ": "JWT", "kid": KEY_ID });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.leaf_pkcs8)
            .expect("leaf key");
        let signature = key_pair
            .sign(&SystemRandom::new(), signing_input.as_bytes())
            .expect("sign token");
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.as_ref()))
    }

    /// `token` with the first signature byte flipped.
    pub fn tamper_signature(&self, token: &str) -> String {
        let (signing_input, signature) = token.rsplit_once('.').expect("compact jws");
        let mut signature = URL_SAFE_NO_PAD.decode(signature).expect("signature");
        signature[0] ^= 0xff;
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    /// The leaf key as JWK with the full chain (leaf, intermediate) in `x5c`.
    pub fn jwk(&self) -> Vec<u8> {
        self.jwk_with_chain(&[self.leaf_certificate(), self.intermediate_certificate()])
    }

    /// The leaf key as JWK with an arbitrary `x5c` chain.
    pub fn jwk_with_chain(&self, chain: &[ParsedCertificate]) -> Vec<u8> {
        let (x, y) = self.leaf_point[1..].split_at(32);
        json!({
            "kty": "EC",
            "crv": "P-256",
            "use": "sig",
            "alg": "ES256",
            "kid": KEY_ID,
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
            "x5c": chain.iter().map(|cert| STANDARD.encode(cert.der())).collect::<Vec<_>>(),
        })
        .to_string()
        .into_bytes()
    }

    /// A proof for the leaf, signed by the intermediate.
    pub fn leaf_ltv_record(&self, status: RevocationStatus, produced_at: DateTime<Utc>) -> LtvRecord {
        ltv_record(&self.leaf, &self.intermediate, status, produced_at)
    }

    /// A proof for the intermediate, signed by the root.
    pub fn intermediate_ltv_record(
        &self,
        status: RevocationStatus,
        produced_at: DateTime<Utc>,
    ) -> LtvRecord {
        ltv_record(&self.intermediate.certificate, &self.root, status, produced_at)
    }

    /// Good proofs for leaf and intermediate, keyed by certificate id.
    pub fn ltv_evidence(&self) -> BTreeMap<String, LtvRecord> {
        [
            self.leaf_ltv_record(RevocationStatus::Good, self.proof_time()),
            self.intermediate_ltv_record(RevocationStatus::Good, self.proof_time()),
        ]
        .into_iter()
        .map(|record| (record.certificate_id.clone(), record))
        .collect()
    }

    /// Sign `message` with the root key.
    pub fn sign_with_root(&self, message: &[u8]) -> Vec<u8> {
        self.root.sign(message)
    }

    /// A complete, valid artifact whose token carries `nonce`.
    pub fn artifact(&self, nonce: &str) -> SignatureArtifact {
        self.artifact_with(
            self.token(&self.claims(nonce)).into_bytes(),
            self.jwk(),
            self.ltv_evidence(),
        )
    }

    /// An artifact assembled from arbitrary parts.
    pub fn artifact_with(
        &self,
        identity_token: Vec<u8>,
        identity_provider_key: Vec<u8>,
        revocation_evidence: BTreeMap<String, LtvRecord>,
    ) -> SignatureArtifact {
        SignatureArtifact {
            identity_token,
            identity_provider_key,
            revocation_evidence,
        }
    }
}

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

/// Returns the PKCS#8 document and the uncompressed public point.
fn generate_key() -> (Vec<u8>, Vec<u8>) {
    let rng = SystemRandom::new();
    let pkcs8 =
        EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).expect("generate key");
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref())
        .expect("load key");
    (pkcs8.as_ref().to_vec(), key_pair.public_key().as_ref().to_vec())
}

fn sign_asn1(pkcs8: &[u8], message: &[u8]) -> Vec<u8> {
    let key_pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8).expect("load key");
    key_pair
        .sign(&SystemRandom::new(), message)
        .expect("sign")
        .as_ref()
        .to_vec()
}

fn utc_time(at: DateTime<Utc>) -> Time {
    let secs = u64::try_from(at.timestamp()).expect("post-epoch time");
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).expect("utc time"))
}

fn issue(template: &CertificateTemplate<'_>, issuer: &Name, issuer_pkcs8: &[u8]) -> ParsedCertificate {
    let algorithm = AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA256,
        parameters: None,
    };
    let basic_constraints = BasicConstraints {
        ca: template.ca,
        path_len_constraint: None,
    };
    let extensions = vec![Extension {
        extn_id: BasicConstraints::OID,
        critical: true,
        extn_value: OctetString::new(basic_constraints.to_der().expect("encode constraints"))
            .expect("octet string"),
    }];

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[template.serial]).expect("serial"),
        signature: algorithm.clone(),
        issuer: issuer.clone(),
        validity: Validity {
            not_before: utc_time(template.not_before),
            not_after: utc_time(template.not_after),
        },
        subject: template.subject.clone(),
        subject_public_key_info: p256_spki(template.public_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    let tbs_der = tbs_certificate.to_der().expect("encode tbs");
    let signature = sign_asn1(issuer_pkcs8, &tbs_der);
    let certificate = Certificate {
        tbs_certificate,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).expect("bit string"),
    };
    ParsedCertificate::from_der(certificate.to_der().expect("encode certificate"))
        .expect("parse certificate")
}

fn p256_spki(point: &[u8]) -> SubjectPublicKeyInfoOwned {
    SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: ID_EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&SECP256R1).expect("curve parameter")),
        },
        subject_public_key: BitString::from_bytes(point).expect("public key bits"),
    }
}

fn ltv_record(
    certificate: &ParsedCertificate,
    issuer: &Authority,
    status: RevocationStatus,
    produced_at: DateTime<Utc>,
) -> LtvRecord {
    let mut record = LtvRecord {
        certificate_id: certificate.id().to_owned(),
        signer: issuer.name.to_der().expect("encode issuer name"),
        status,
        produced_at,
        signature: Vec::new(),
    };
    record.signature = issuer.sign(&record.unsigned_canonical_bytes());
    record
}
