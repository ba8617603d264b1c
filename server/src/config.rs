//! Node configuration, a JSON document with an environment fallback for its path.

use crate::{
    retry::RetryPolicy,
    verifier::{DevModeVerifier, Groth16Verifier, KeyError, ProofVerifier, VerificationKey},
};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::info;

pub const CONFIG_ENV: &str = "OMEGA_CONFIG";
pub const LOG_ENV: &str = "OMEGA_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("verification key for {version} at {path}: {source}")]
    VerificationKey {
        version: String,
        path: PathBuf,
        #[source]
        source: KeyError,
    },
    #[error("current circuit version {0} has no verification key")]
    MissingCurrentKey(String),
    #[error("current circuit version {0} is marked vulnerable")]
    VulnerableCurrentVersion(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub verifier: VerifierConfig,
    pub processor: RetryPolicy,
    pub membership: MembershipConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CircuitKey {
    pub version: String,
    pub verification_key: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub current_version: String,
    pub circuits: Vec<CircuitKey>,
    pub deprecated: Vec<String>,
    pub vulnerable: Vec<String>,
    /// Accept every proof unchecked. Never on unless the document says so.
    pub dev_mode: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            current_version: "omega-v1".to_string(),
            circuits: Vec::new(),
            deprecated: Vec::new(),
            vulnerable: Vec::new(),
            dev_mode: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// How many of a feed's newest roots a proof may be built against.
    pub accepted_root_window: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            accepted_root_window: 1,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the config at `path`, or at `$OMEGA_CONFIG`, or falls back to defaults.
    ///
    /// Relative key paths are resolved against the config file's directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => PathBuf::from(p),
                None => {
                    info!("no config given, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let json = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_json(&json)?;
        if let Some(dir) = path.parent() {
            for circuit in &mut config.verifier.circuits {
                if circuit.verification_key.is_relative() {
                    circuit.verification_key = dir.join(&circuit.verification_key);
                }
            }
        }
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

impl VerifierConfig {
    /// Loads every configured key and builds the verifier they describe.
    pub fn build(&self) -> Result<Arc<dyn ProofVerifier>, ConfigError> {
        if self.dev_mode {
            return Ok(Arc::new(DevModeVerifier::new(&self.current_version)));
        }
        if self.vulnerable.contains(&self.current_version) {
            return Err(ConfigError::VulnerableCurrentVersion(
                self.current_version.clone(),
            ));
        }

        let keys = self
            .circuits
            .iter()
            .map(|c| {
                VerificationKey::load(&c.version, &c.verification_key).map_err(|source| {
                    ConfigError::VerificationKey {
                        version: c.version.clone(),
                        path: c.verification_key.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if !keys.iter().any(|k| k.version == self.current_version) {
            return Err(ConfigError::MissingCurrentKey(self.current_version.clone()));
        }

        info!(
            current = %self.current_version,
            versions = keys.len(),
            "loaded verification keys"
        );
        Ok(Arc::new(Groth16Verifier::new(
            self.current_version.clone(),
            keys,
            self.deprecated.iter().cloned(),
            self.vulnerable.iter().cloned(),
        )))
    }
}
