//! Binding the verified identity to the submitted document hash.

use std::io::Read;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::VerificationError;
use crate::signature::URL_SAFE_LENIENT;
use crate::token::TokenVerification;

/// Chunk size for streaming document hashing.
pub const HASH_CHUNK_SIZE: usize = 100 * 1024;

/// How strongly a valid signature is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureLevel {
    /// Token and certificate chain verified; no revocation evidence checked.
    Basic,
    /// Additionally, revocation evidence proved every chain certificate
    /// good at the reference time.
    LongTerm,
}

/// A signature bound to its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSignature {
    /// Verified signer email.
    pub signer_email: String,
    /// Assurance level.
    pub level: SignatureLevel,
    /// Token issuance time.
    pub signature_time: DateTime<Utc>,
}

/// Consume a token verification and bind its nonce to `target_hash`.
///
/// # Errors
///
/// Returns [`VerificationError::HashMismatch`] if the nonce does not encode
/// `target_hash`.
pub fn bind(
    verification: TokenVerification,
    target_hash: &str,
) -> Result<BoundSignature, VerificationError> {
    let TokenVerification { claims, nonce } = verification;
    let nonce = nonce.into_inner();

    if !nonce_matches(&nonce, target_hash) {
        return Err(VerificationError::HashMismatch {
            hash: target_hash.trim().to_owned(),
            nonce,
        });
    }

    let level = if claims.long_term.is_some() {
        SignatureLevel::LongTerm
    } else {
        SignatureLevel::Basic
    };

    Ok(BoundSignature {
        signer_email: claims.email,
        level,
        signature_time: claims.issued_at,
    })
}

/// Whether `nonce` encodes the hex digest `target_hash`.
///
/// Accepts the same hex string in any case, or the base64url encoding
/// (padded or not) of the digest bytes. Empty values never match.
pub fn nonce_matches(nonce: &str, target_hash: &str) -> bool {
    let nonce = nonce.trim();
    let hash = target_hash.trim();
    if nonce.is_empty() || hash.is_empty() {
        return false;
    }
    if nonce.eq_ignore_ascii_case(hash) {
        return true;
    }
    match (hex::decode(hash), URL_SAFE_LENIENT.decode(nonce)) {
        (Ok(digest), Ok(encoded)) => digest == encoded,
        _ => false,
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of everything `reader` yields, read in
/// [`HASH_CHUNK_SIZE`] chunks.
///
/// # Errors
///
/// Propagates read errors.
pub fn sha256_reader(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_nonce_matches_case_insensitively() {
        let hash = sha256_hex(b"doc-A");
        assert!(nonce_matches(&hash.to_uppercase(), &hash));
        assert!(nonce_matches(&hash, &format!("  {hash}\n")));
    }

    #[test]
    fn base64url_nonce_matches_digest() {
        let digest = Sha256::digest(b"doc-A");
        let hash = hex::encode(digest);
        let unpadded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        let padded = base64::engine::general_purpose::URL_SAFE.encode(digest);
        assert!(nonce_matches(&unpadded, &hash));
        assert!(nonce_matches(&padded, &hash));
    }

    #[test]
    fn different_document_does_not_match() {
        assert!(!nonce_matches(&sha256_hex(b"doc-A"), &sha256_hex(b"doc-B")));
    }

    #[test]
    fn empty_values_never_match() {
        assert!(!nonce_matches("", ""));
        assert!(!nonce_matches("", &sha256_hex(b"doc-A")));
        assert!(!nonce_matches(&sha256_hex(b"doc-A"), "   "));
    }

    #[test]
    fn reader_hash_equals_slice_hash() {
        let data = vec![0x5au8; HASH_CHUNK_SIZE * 2 + 17];
        let streamed = sha256_reader(data.as_slice()).expect("read");
        assert_eq!(streamed, sha256_hex(&data));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let hash = sha256_hex(b"doc-A");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
