//! Signature artifacts for identity-bound document signatures.
//!
//! `notarius-artifact` models the signature file a client submits for
//! verification: the identity provider's ID token, the provider's public
//! key (a JWK carrying its certificate chain), and long-term-validation
//! records proving the chain was not revoked at signing time. It also
//! owns the protobuf wire format those files are exchanged in.

pub mod artifact;
pub mod error;
pub mod pem;
pub mod wire;

pub use artifact::{LtvRecord, RevocationStatus, SignatureArtifact, certificate_id};
pub use error::ArtifactError;
