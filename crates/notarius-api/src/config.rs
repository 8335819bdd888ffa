//! Service configuration loaded from TOML and environment variables.
//!
//! Resolution order:
//! 1. An explicit `--config` path, which must exist
//! 2. `notarius.toml` in the XDG config dir (`~/.config/notarius/`), if present
//! 3. Built-in defaults
//!
//! `NOTARIUS_*` environment variables override whatever the file says.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use notarius_verifier::config::{DEFAULT_LEEWAY_SECS, TrustRootError};
use notarius_verifier::{LtvMode, ReferenceClock, TrustConfig, TrustRoots};
use serde::Deserialize;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

const ENV_BIND_ADDR: &str = "NOTARIUS_BIND_ADDR";
const ENV_ISSUER: &str = "NOTARIUS_ISSUER";
const ENV_CLIENT_ID: &str = "NOTARIUS_CLIENT_ID";
const ENV_ROOT_CA: &str = "NOTARIUS_ROOT_CA";

/// Errors loading or applying the service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("could not read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServiceConfig`].
    #[error("invalid config `{path}`: {source}")]
    Parse {
        /// Path of the offending file.
        path: String,
        /// TOML error.
        source: toml::de::Error,
    },

    /// A required setting is absent from both file and environment.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A setting has an unusable value.
    #[error("invalid setting `{name}`: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The process-wide root CA could not be loaded.
    #[error("could not load root CA: {0}")]
    RootCa(#[source] TrustRootError),

    /// An additional root could not be loaded.
    #[error("could not load additional root {path}: {source}")]
    AdditionalRoot {
        /// Path of the offending file.
        path: PathBuf,
        /// Load error.
        source: TrustRootError,
    },
}

/// Service settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Listen address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Expected token issuer.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Client id expected in the token audience.
    #[serde(default)]
    pub client_id: Option<String>,
    /// PEM file of the process-wide default root.
    #[serde(default)]
    pub root_ca: Option<PathBuf>,
    /// Further PEM files of trusted roots.
    #[serde(default)]
    pub additional_roots: Vec<PathBuf>,
    /// Long-term validation policy.
    #[serde(default)]
    pub ltv_mode: LtvMode,
    /// Clock skew allowance on token `nbf`/`iat`, in seconds.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u32,
    /// Fixed reference time; absent means the wall clock.
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_owned()
}

fn default_leeway_secs() -> u32 {
    u32::try_from(DEFAULT_LEEWAY_SECS).unwrap_or(u32::MAX)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            issuer: None,
            client_id: None,
            root_ca: None,
            additional_roots: Vec::new(),
            ltv_mode: LtvMode::default(),
            leeway_secs: default_leeway_secs(),
            reference_time: None,
        }
    }
}

impl ServiceConfig {
    /// The per-user config file location, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "notarius", "notarius")
            .map(|dirs| dirs.config_dir().join("notarius.toml"))
    }

    /// Parse a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Resolve the configuration and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if an explicit `path` cannot be loaded, or the default file
    /// exists but is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "using default config file");
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override settings from `lookup`, normally the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(issuer) = lookup(ENV_ISSUER) {
            self.issuer = Some(issuer);
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(client_id);
        }
        if let Some(root_ca) = lookup(ENV_ROOT_CA) {
            self.root_ca = Some(PathBuf::from(root_ca));
        }
    }

    /// The parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_addr` is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|e| ConfigError::Invalid {
            name: "bind_addr",
            reason: format!("`{}`: {e}", self.bind_addr),
        })
    }

    /// Build the trust configuration, loading every root from disk.
    ///
    /// This is the startup gate: a service must not accept requests unless
    /// this succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for absent settings,
    /// [`ConfigError::RootCa`] if the default root cannot be loaded, or
    /// [`ConfigError::AdditionalRoot`] for a bad additional root.
    pub fn trust_config(&self) -> Result<TrustConfig, ConfigError> {
        let issuer = self.issuer.clone().ok_or(ConfigError::Missing("issuer"))?;
        let client_id = self
            .client_id
            .clone()
            .ok_or(ConfigError::Missing("client_id"))?;
        let root_ca = self.root_ca.as_ref().ok_or(ConfigError::Missing("root_ca"))?;

        let mut roots = TrustRoots::load(root_ca).map_err(ConfigError::RootCa)?;
        for path in &self.additional_roots {
            let extra = TrustRoots::load(path).map_err(|source| ConfigError::AdditionalRoot {
                path: path.clone(),
                source,
            })?;
            roots = roots.with_additional(extra.iter().cloned());
        }

        let clock = self
            .reference_time
            .map_or_else(ReferenceClock::wall_clock, ReferenceClock::fixed);

        tracing::info!(
            %issuer,
            roots = roots.len(),
            ltv_mode = ?self.ltv_mode,
            fixed_reference_time = self.reference_time.is_some(),
            "trust configuration loaded"
        );

        Ok(TrustConfig::new(issuer, client_id, roots)
            .with_clock(clock)
            .with_leeway(TimeDelta::seconds(i64::from(self.leeway_secs)))
            .with_ltv_mode(self.ltv_mode))
    }
}
