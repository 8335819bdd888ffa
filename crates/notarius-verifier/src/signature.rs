//! Signature primitives for identity tokens and certificates.
//!
//! The identity provider's key ships inside the artifact as a JWK, so
//! resolving the token's signing key never touches the network. Whether
//! that key deserves trust is a separate question answered by
//! [`crate::chain`]; this module only answers "is this token correctly
//! signed by this key".
//!
//! All cryptography goes through `aws-lc-rs`.

use std::fmt;
use std::str::FromStr;

use aws_lc_rs::signature::{self, RsaParameters, RsaPublicKeyComponents, UnparsedPublicKey};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use der::asn1::UintRef;
use der::{Decode, Sequence};
use serde::Deserialize;
use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoOwned};

use crate::chain::ParsedCertificate;
use crate::error::VerificationError;

/// Base64url that accepts both padded and unpadded input.
pub(crate) const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// JWS algorithms accepted for identity tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    Rs512,
    /// RSASSA-PSS with SHA-256.
    Ps256,
    /// ECDSA P-256 with SHA-256.
    Es256,
    /// ECDSA P-384 with SHA-384.
    Es384,
}

impl JwsAlgorithm {
    /// The JOSE name of this algorithm.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
        }
    }
}

impl FromStr for JwsAlgorithm {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "PS256" => Ok(Self::Ps256),
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            other => Err(format!("unsupported algorithm `{other}`")),
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elliptic curves supported for EC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
}

impl EcCurve {
    const fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
        }
    }
}

/// Public key material of the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// RSA modulus and exponent, big-endian without leading zeros.
    Rsa {
        /// Modulus.
        n: Vec<u8>,
        /// Public exponent.
        e: Vec<u8>,
    },
    /// EC public key as an uncompressed SEC1 point.
    Ec {
        /// Curve of the key.
        curve: EcCurve,
        /// `0x04 || x || y`.
        point: Vec<u8>,
    },
}

impl KeyMaterial {
    /// Short description of the key type, e.g. `EC P-256`.
    pub fn describe(&self) -> String {
        match self {
            Self::Rsa { n, .. } => format!("RSA {}-bit", n.len() * 8),
            Self::Ec {
                curve: EcCurve::P256,
                ..
            } => "EC P-256".to_owned(),
            Self::Ec {
                curve: EcCurve::P384,
                ..
            } => "EC P-384".to_owned(),
        }
    }

    /// Whether `spki` carries exactly this key.
    pub fn matches_spki(&self, spki: &SubjectPublicKeyInfoOwned) -> bool {
        let Some(key_bytes) = spki.subject_public_key.as_bytes() else {
            return false;
        };
        match (self, spki_kind(spki)) {
            (Self::Ec { curve, point }, Some(SpkiKind::Ec(spki_curve))) => {
                *curve == spki_curve && point.as_slice() == key_bytes
            }
            (Self::Rsa { n, e }, Some(SpkiKind::Rsa)) => RsaPublicKeyDer::from_der(key_bytes)
                .is_ok_and(|key| {
                    key.modulus.as_bytes() == strip_leading_zeros(n)
                        && key.public_exponent.as_bytes() == strip_leading_zeros(e)
                }),
            _ => false,
        }
    }
}

/// PKCS#1 `RSAPublicKey`, the payload of an RSA SPKI bit string.
#[derive(Sequence)]
struct RsaPublicKeyDer<'a> {
    modulus: UintRef<'a>,
    public_exponent: UintRef<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpkiKind {
    Rsa,
    Ec(EcCurve),
}

fn spki_kind(spki: &SubjectPublicKeyInfoOwned) -> Option<SpkiKind> {
    if spki.algorithm.oid == RSA_ENCRYPTION {
        return Some(SpkiKind::Rsa);
    }
    if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
        return None;
    }
    let curve = spki
        .algorithm
        .parameters
        .as_ref()?
        .decode_as::<ObjectIdentifier>()
        .ok()?;
    if curve == SECP256R1 {
        Some(SpkiKind::Ec(EcCurve::P256))
    } else if curve == SECP384R1 {
        Some(SpkiKind::Ec(EcCurve::P384))
    } else {
        None
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// JSON Web Key as shipped in a signature artifact.
#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
    n: Option<String>,
    e: Option<String>,
    #[serde(default)]
    x5c: Vec<String>,
}

/// The identity provider's signing key together with its certificate chain.
#[derive(Debug, Clone)]
pub struct IdentityProviderKey {
    /// Key id, if the JWK declares one.
    pub kid: Option<String>,
    /// Algorithm the JWK is restricted to, if it declares one.
    pub algorithm: Option<JwsAlgorithm>,
    /// The public key itself.
    pub material: KeyMaterial,
    /// Certificate chain from `x5c`, leaf first.
    pub chain: Vec<ParsedCertificate>,
}

impl IdentityProviderKey {
    /// Decode a JWK (JSON) including its `x5c` chain.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedKey`] if the JSON, key
    /// components, or any chain certificate cannot be decoded.
    pub fn from_jwk(json: &[u8]) -> Result<Self, VerificationError> {
        let jwk: Jwk = serde_json::from_slice(json)
            .map_err(|e| VerificationError::MalformedKey(format!("could not unmarshal jwk: {e}")))?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(VerificationError::MalformedKey(format!(
                    "key use is `{key_use}`, expected `sig`"
                )));
            }
        }

        let algorithm = jwk
            .alg
            .as_deref()
            .map(JwsAlgorithm::from_str)
            .transpose()
            .map_err(VerificationError::MalformedKey)?;

        let material = match jwk.kty.as_str() {
            "RSA" => KeyMaterial::Rsa {
                n: strip_leading_zeros(&component(jwk.n.as_deref(), "n")?).to_vec(),
                e: strip_leading_zeros(&component(jwk.e.as_deref(), "e")?).to_vec(),
            },
            "EC" => {
                let curve = match jwk.crv.as_deref() {
                    Some("P-256") => EcCurve::P256,
                    Some("P-384") => EcCurve::P384,
                    Some(other) => {
                        return Err(VerificationError::MalformedKey(format!(
                            "unsupported curve `{other}`"
                        )));
                    }
                    None => {
                        return Err(VerificationError::MalformedKey(
                            "EC key without `crv`".to_owned(),
                        ));
                    }
                };
                let x = component(jwk.x.as_deref(), "x")?;
                let y = component(jwk.y.as_deref(), "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(VerificationError::MalformedKey(format!(
                        "EC coordinates must be {} bytes",
                        curve.coordinate_len()
                    )));
                }
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(&x);
                point.extend_from_slice(&y);
                KeyMaterial::Ec { curve, point }
            }
            other => {
                return Err(VerificationError::MalformedKey(format!(
                    "unsupported key type `{other}`"
                )));
            }
        };

        let chain = jwk
            .x5c
            .iter()
            .enumerate()
            .map(|(index, encoded)| {
                let der = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| {
                        VerificationError::MalformedKey(format!("x5c[{index}] is not base64: {e}"))
                    })?;
                ParsedCertificate::from_der(der).map_err(|e| {
                    VerificationError::MalformedKey(format!(
                        "x5c[{index}] is not an X.509 certificate: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kid: jwk.kid,
            algorithm,
            material,
            chain,
        })
    }

    /// The leaf certificate of the chain, if any.
    pub fn leaf(&self) -> Option<&ParsedCertificate> {
        self.chain.first()
    }
}

fn component(value: Option<&str>, name: &str) -> Result<Vec<u8>, VerificationError> {
    let value = value
        .ok_or_else(|| VerificationError::MalformedKey(format!("missing key component `{name}`")))?;
    URL_SAFE_LENIENT
        .decode(value)
        .map_err(|e| VerificationError::MalformedKey(format!("key component `{name}`: {e}")))
}

/// Something that can check a token signature made with one key.
///
/// Kept apart from [`crate::chain::TrustChainValidator`]: a token can be
/// correctly signed by a key nobody should trust, and the two questions
/// are answered and tested independently.
pub trait TokenSignatureVerifier {
    /// Verify `signature` over the JWS `signing_input` under `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidSignature`] if the signature
    /// does not verify or the algorithm does not fit the key.
    fn verify_token_signature(
        &self,
        algorithm: JwsAlgorithm,
        signing_input: &[u8],
        signature: &[u8],
    ) -> Result<(), VerificationError>;
}

impl TokenSignatureVerifier for IdentityProviderKey {
    fn verify_token_signature(
        &self,
        algorithm: JwsAlgorithm,
        signing_input: &[u8],
        signature: &[u8],
    ) -> Result<(), VerificationError> {
        if let Some(declared) = self.algorithm {
            if declared != algorithm {
                return Err(VerificationError::InvalidSignature(format!(
                    "token uses {algorithm} but the key is restricted to {declared}"
                )));
            }
        }

        let verified = match (&self.material, algorithm) {
            (KeyMaterial::Rsa { n, e }, JwsAlgorithm::Rs256) => {
                verify_rsa(n, e, &signature::RSA_PKCS1_2048_8192_SHA256, signing_input, signature)
            }
            (KeyMaterial::Rsa { n, e }, JwsAlgorithm::Rs384) => {
                verify_rsa(n, e, &signature::RSA_PKCS1_2048_8192_SHA384, signing_input, signature)
            }
            (KeyMaterial::Rsa { n, e }, JwsAlgorithm::Rs512) => {
                verify_rsa(n, e, &signature::RSA_PKCS1_2048_8192_SHA512, signing_input, signature)
            }
            (KeyMaterial::Rsa { n, e }, JwsAlgorithm::Ps256) => {
                verify_rsa(n, e, &signature::RSA_PSS_2048_8192_SHA256, signing_input, signature)
            }
            (
                KeyMaterial::Ec {
                    curve: EcCurve::P256,
                    point,
                },
                JwsAlgorithm::Es256,
            ) => UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_FIXED, point)
                .verify(signing_input, signature)
                .is_ok(),
            (
                KeyMaterial::Ec {
                    curve: EcCurve::P384,
                    point,
                },
                JwsAlgorithm::Es384,
            ) => UnparsedPublicKey::new(&signature::ECDSA_P384_SHA384_FIXED, point)
                .verify(signing_input, signature)
                .is_ok(),
            (material, algorithm) => {
                return Err(VerificationError::InvalidSignature(format!(
                    "{algorithm} cannot be used with an {} key",
                    material.describe()
                )));
            }
        };

        if verified {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature(format!(
                "{algorithm} signature does not match the identity provider key"
            )))
        }
    }
}

fn verify_rsa(n: &[u8], e: &[u8], params: &RsaParameters, message: &[u8], sig: &[u8]) -> bool {
    RsaPublicKeyComponents { n, e }
        .verify(params, message, sig)
        .is_ok()
}

/// Verify an X.509 signature (DER-encoded for ECDSA) made by `issuer_spki`
/// under the signature algorithm `algorithm`.
pub(crate) fn verify_x509_signature(
    algorithm: &ObjectIdentifier,
    issuer_spki: &SubjectPublicKeyInfoOwned,
    message: &[u8],
    sig: &[u8],
) -> Result<(), String> {
    let key = issuer_spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| "issuer public key is not byte aligned".to_owned())?;
    let kind = spki_kind(issuer_spki).ok_or_else(|| "unsupported issuer key type".to_owned())?;

    let verification: &'static dyn signature::VerificationAlgorithm =
        match (kind, *algorithm) {
            (SpkiKind::Ec(EcCurve::P256), alg) if alg == ECDSA_WITH_SHA256 => {
                &signature::ECDSA_P256_SHA256_ASN1
            }
            (SpkiKind::Ec(EcCurve::P256), alg) if alg == ECDSA_WITH_SHA384 => {
                &signature::ECDSA_P256_SHA384_ASN1
            }
            (SpkiKind::Ec(EcCurve::P384), alg) if alg == ECDSA_WITH_SHA256 => {
                &signature::ECDSA_P384_SHA256_ASN1
            }
            (SpkiKind::Ec(EcCurve::P384), alg) if alg == ECDSA_WITH_SHA384 => {
                &signature::ECDSA_P384_SHA384_ASN1
            }
            (SpkiKind::Rsa, alg) if alg == SHA256_WITH_RSA => &signature::RSA_PKCS1_2048_8192_SHA256,
            (SpkiKind::Rsa, alg) if alg == SHA384_WITH_RSA => &signature::RSA_PKCS1_2048_8192_SHA384,
            (SpkiKind::Rsa, alg) if alg == SHA512_WITH_RSA => &signature::RSA_PKCS1_2048_8192_SHA512,
            (_, alg) => return Err(format!("unsupported signature algorithm {alg}")),
        };

    UnparsedPublicKey::new(verification, key)
        .verify(message, sig)
        .map_err(|_| "signature does not verify".to_owned())
}

/// Verify a detached signature made with `issuer_spki` using the default
/// algorithm for its key type: ECDSA (DER) with the curve's hash, or RSA
/// PKCS#1 v1.5 with SHA-256.
pub(crate) fn verify_with_issuer_key(
    issuer_spki: &SubjectPublicKeyInfoOwned,
    message: &[u8],
    sig: &[u8],
) -> Result<(), String> {
    let algorithm = match spki_kind(issuer_spki) {
        Some(SpkiKind::Ec(EcCurve::P256)) => ECDSA_WITH_SHA256,
        Some(SpkiKind::Ec(EcCurve::P384)) => ECDSA_WITH_SHA384,
        Some(SpkiKind::Rsa) => SHA256_WITH_RSA,
        None => return Err("unsupported issuer key type".to_owned()),
    };
    verify_x509_signature(&algorithm, issuer_spki, message, sig)
}
