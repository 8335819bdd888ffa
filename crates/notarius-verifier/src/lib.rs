//! Verification engine for identity-bound document signatures.
//!
//! `notarius-verifier` decides whether a signature artifact proves that a
//! verified email identity attested a given document hash. One call
//! composes four independent trust decisions into a single fail-closed
//! verdict:
//! 1. **Token**: the ID token is correctly signed by the embedded key and
//!    its issuer, audience, validity window and email claims check out
//! 2. **Chain**: the embedded key is vouched for by a certificate chain
//!    ending at a configured trust root
//! 3. **LTV**: revocation evidence shows every chain certificate was good
//!    at the reference time
//! 4. **Binding**: the token's nonce is the submitted document hash
//!
//! Every time-sensitive check is evaluated against the configured
//! reference time rather than the wall clock, so a signature stays
//! verifiable after the provider's credentials expire.

pub mod binding;
pub mod chain;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
pub mod inspect;
pub mod ltv;
pub mod signature;
pub mod token;
pub mod verify;

// Re-export primary types for convenience.
pub use binding::SignatureLevel;
pub use config::{LtvMode, ReferenceClock, TrustConfig, TrustRoots};
pub use error::{ErrorClass, ErrorKind, VerificationError};
pub use verify::{VerificationVerdict, Verifier, VerifyOptions};
