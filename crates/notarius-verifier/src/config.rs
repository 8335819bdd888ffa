//! Trust configuration: what the verifier trusts and when "now" is.
//!
//! A [`TrustConfig`] is built once at startup and passed read-only into
//! every verification call. Building it is fallible: a root CA that cannot
//! be loaded is reported when the process starts, never deferred to the
//! first request.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use notarius_artifact::ArtifactError;
use notarius_artifact::pem::pem_blocks;
use serde::{Deserialize, Serialize};

use crate::chain::ParsedCertificate;

/// Default clock skew allowance on a token's `nbf` and `iat`. `exp` gets none.
pub const DEFAULT_LEEWAY_SECS: i64 = 60;

/// Errors loading trust roots.
#[derive(Debug, thiserror::Error)]
pub enum TrustRootError {
    /// The root file could not be read.
    #[error("could not read trust roots from {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The PEM framing is invalid.
    #[error("invalid PEM: {0}")]
    Pem(#[from] ArtifactError),

    /// A block decoded but is not an X.509 certificate.
    #[error("trust root {index} is not a valid certificate: {reason}")]
    InvalidCertificate {
        /// Zero-based position of the offending certificate.
        index: usize,
        /// Decoder message.
        reason: String,
    },

    /// The input contained no certificates.
    #[error("no certificates found")]
    Empty,
}

/// The set of certificates trusted as chain anchors.
///
/// Cheap to clone; the parsed certificates are shared.
#[derive(Debug, Clone)]
pub struct TrustRoots {
    anchors: Arc<[ParsedCertificate]>,
}

impl TrustRoots {
    /// Trust exactly `anchors`.
    pub fn new(anchors: Vec<ParsedCertificate>) -> Self {
        Self {
            anchors: anchors.into(),
        }
    }

    /// Parse every `CERTIFICATE` block of a PEM bundle.
    ///
    /// # Errors
    ///
    /// Fails if the PEM is malformed, a certificate does not decode, or
    /// the bundle holds no certificates.
    pub fn from_pem(pem: &str) -> Result<Self, TrustRootError> {
        let anchors = pem_blocks(pem)?
            .into_iter()
            .filter(|block| {
                let keep = block.label == "CERTIFICATE";
                if !keep {
                    tracing::debug!(label = %block.label, "skipping non-certificate PEM block");
                }
                keep
            })
            .enumerate()
            .map(|(index, block)| {
                ParsedCertificate::from_der(block.der).map_err(|e| {
                    TrustRootError::InvalidCertificate {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if anchors.is_empty() {
            return Err(TrustRootError::Empty);
        }
        Ok(Self::new(anchors))
    }

    /// Load roots from a file holding either a PEM bundle or one DER
    /// certificate.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not hold certificates.
    pub fn load(path: &Path) -> Result<Self, TrustRootError> {
        let data = std::fs::read(path).map_err(|source| TrustRootError::Io {
            path: path.to_owned(),
            source,
        })?;

        let roots = match std::str::from_utf8(&data) {
            Ok(text) if text.contains("-----BEGIN") => Self::from_pem(text)?,
            _ => {
                let anchor = ParsedCertificate::from_der(data).map_err(|e| {
                    TrustRootError::InvalidCertificate {
                        index: 0,
                        reason: e.to_string(),
                    }
                })?;
                Self::new(vec![anchor])
            }
        };

        tracing::debug!(path = %path.display(), count = roots.len(), "loaded trust roots");
        Ok(roots)
    }

    /// Extend the set with `extra` anchors, skipping duplicates.
    #[must_use]
    pub fn with_additional(self, extra: impl IntoIterator<Item = ParsedCertificate>) -> Self {
        let mut anchors = self.anchors.to_vec();
        for anchor in extra {
            if !anchors.contains(&anchor) {
                anchors.push(anchor);
            }
        }
        Self::new(anchors)
    }

    /// Iterate over the trusted anchors.
    pub fn iter(&self) -> impl Iterator<Item = &ParsedCertificate> {
        self.anchors.iter()
    }

    /// The anchor byte-identical to `certificate`, if it is trusted.
    pub fn find(&self, certificate: &ParsedCertificate) -> Option<&ParsedCertificate> {
        self.anchors.iter().find(|anchor| *anchor == certificate)
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether no anchors are configured.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Source of the reference time that every time-dependent check uses.
///
/// The clock is sampled once per verification call.
#[derive(Clone)]
pub struct ReferenceClock(Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>);

impl ReferenceClock {
    /// The system clock.
    pub fn wall_clock() -> Self {
        Self::from_fn(Utc::now)
    }

    /// Always report `at`.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::from_fn(move || at)
    }

    /// Any caller-provided time source.
    pub fn from_fn(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self(Arc::new(clock))
    }

    /// Sample the clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.0)()
    }
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::wall_clock()
    }
}

impl fmt::Debug for ReferenceClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReferenceClock").finish_non_exhaustive()
    }
}

/// When long-term validation of the identity provider key is performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtvMode {
    /// Never, unless a request explicitly asks for it.
    Disabled,
    /// Whenever the artifact carries revocation evidence.
    #[default]
    WhenPresent,
    /// Always. Artifacts without evidence fail.
    Required,
}

/// Everything a verification call trusts.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Client id that must appear in `aud`.
    pub client_id: String,
    /// Chain anchors.
    pub trust_roots: TrustRoots,
    /// Reference time source.
    pub clock: ReferenceClock,
    /// Clock skew allowance on `nbf` and `iat`.
    pub leeway: TimeDelta,
    /// Default long-term validation policy.
    pub ltv_mode: LtvMode,
}

impl TrustConfig {
    /// A configuration with the wall clock, default leeway and
    /// [`LtvMode::WhenPresent`].
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        trust_roots: TrustRoots,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            trust_roots,
            clock: ReferenceClock::default(),
            leeway: TimeDelta::seconds(DEFAULT_LEEWAY_SECS),
            ltv_mode: LtvMode::default(),
        }
    }

    /// Replace the reference clock.
    #[must_use]
    pub fn with_clock(mut self, clock: ReferenceClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the validity leeway.
    #[must_use]
    pub fn with_leeway(mut self, leeway: TimeDelta) -> Self {
        self.leeway = leeway;
        self
    }

    /// Replace the long-term validation policy.
    #[must_use]
    pub fn with_ltv_mode(mut self, ltv_mode: LtvMode) -> Self {
        self.ltv_mode = ltv_mode;
        self
    }

    /// Trust additional anchors besides the configured roots.
    #[must_use]
    pub fn with_additional_roots(
        mut self,
        extra: impl IntoIterator<Item = ParsedCertificate>,
    ) -> Self {
        self.trust_roots = self.trust_roots.with_additional(extra);
        self
    }
}
