//! Protobuf wire messages for signature files.
//!
//! These mirror the `SignatureFile` schema exchanged with signing
//! clients:
//!
//! ```text
//! message SignatureFile {
//!   bytes id_token = 1;
//!   bytes jwk_idp = 2;
//!   map<string, LtvRecord> ltv_idp = 3;
//! }
//!
//! message LtvRecord {
//!   string certificate_id = 1;
//!   bytes signer = 2;
//!   RevocationStatus status = 3;
//!   int64 produced_at = 4;
//!   bytes signature = 5;
//! }
//! ```
//!
//! The map uses a `BTreeMap` so that encoding is deterministic.

use std::collections::BTreeMap;

/// A signature file as framed on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SignatureFile {
    /// Compact JWS ID token issued by the identity provider.
    #[prost(bytes = "vec", tag = "1")]
    pub id_token: Vec<u8>,
    /// JSON Web Key of the identity provider, including `x5c`.
    #[prost(bytes = "vec", tag = "2")]
    pub jwk_idp: Vec<u8>,
    /// Revocation evidence keyed by certificate id.
    #[prost(btree_map = "string, message", tag = "3")]
    pub ltv_idp: BTreeMap<String, LtvRecord>,
}

/// A revocation proof for one certificate, as framed on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LtvRecord {
    /// Id of the certificate this proof covers.
    #[prost(string, tag = "1")]
    pub certificate_id: String,
    /// DER-encoded X.509 name of the proof signer.
    #[prost(bytes = "vec", tag = "2")]
    pub signer: Vec<u8>,
    /// Asserted revocation status.
    #[prost(enumeration = "RevocationStatus", tag = "3")]
    pub status: i32,
    /// Unix timestamp (seconds) at which the proof was produced.
    #[prost(int64, tag = "4")]
    pub produced_at: i64,
    /// Signature over the unsigned canonical bytes of this record.
    #[prost(bytes = "vec", tag = "5")]
    pub signature: Vec<u8>,
}

/// Revocation status as framed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RevocationStatus {
    /// The responder does not know the certificate.
    Unknown = 0,
    /// The certificate was not revoked when the proof was produced.
    Good = 1,
    /// The certificate was revoked when the proof was produced.
    Revoked = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn out_of_range_status_reads_as_unknown() {
        let record = LtvRecord {
            status: 42,
            ..Default::default()
        };
        assert_eq!(record.status(), RevocationStatus::Unknown);
    }

    #[test]
    fn map_encoding_is_deterministic() {
        let mut first = SignatureFile::default();
        let mut second = SignatureFile::default();
        for id in ["b", "a", "c"] {
            first.ltv_idp.insert(id.to_owned(), LtvRecord::default());
        }
        for id in ["c", "b", "a"] {
            second.ltv_idp.insert(id.to_owned(), LtvRecord::default());
        }
        assert_eq!(first.encode_to_vec(), second.encode_to_vec());
    }
}
