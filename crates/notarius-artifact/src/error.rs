//! Error types for artifact decoding.

/// Errors raised while decoding or loading a signature artifact.
///
/// Every variant is attributable to the submitted input.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The base64 transport encoding could not be decoded.
    #[error("could not decode signature: {0}")]
    Base64(String),

    /// The protobuf framing could not be decoded.
    #[error("could not unmarshal signature to protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// A revocation record carries values that cannot be represented.
    #[error("invalid LTV record for certificate `{certificate_id}`: {reason}")]
    InvalidRecord {
        /// The certificate id the record is filed under.
        certificate_id: String,
        /// What is wrong with the record.
        reason: String,
    },

    /// PEM input was not well formed.
    #[error("invalid PEM: {0}")]
    Pem(String),

    /// I/O error while reading an artifact from disk.
    #[error("artifact I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
