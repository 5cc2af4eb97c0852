//! # Configuration
//!
//! Two JSON documents drive the daemon:
//!
//! - the **tower map** (`{"<ssid>": {"bssid", "freq", "color"}}`), see [`towers`];
//! - the **runtime tunables** (intervals, margins, LED options), see [`runtime`].
//!
//! Both are parsed into loose `*Input` shapes first and then resolved into
//! typed configs. Resolution collects every rule violation instead of
//! stopping at the first, so `--validate-config` can list them all.

pub mod runtime;
pub mod towers;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use runtime::{RuntimeConfig, UnknownMode};
pub use towers::{Color, Tower, TowerSet};

/// One failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Where the rule failed, e.g. `runtime.pixels` or `towers.TowerA.bssid`.
    pub scope: String,
    pub message: String,
}

impl Violation {
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} configuration violation(s)", .0.len())]
    Invalid(Vec<Violation>),
}

impl ConfigError {
    /// Flatten any config error into reportable violations.
    pub fn into_violations(self) -> Vec<Violation> {
        match self {
            ConfigError::Io { path, source } => {
                vec![Violation::new(path.display().to_string(), format!("cannot read: {source}"))]
            }
            ConfigError::Json { path, source } => {
                vec![Violation::new(path.display().to_string(), format!("invalid JSON: {source}"))]
            }
            ConfigError::Invalid(v) => v,
        }
    }
}

/// Fully validated configuration. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    pub towers: TowerSet,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load and validate both documents. On failure the error carries the
    /// violations of *both* files.
    pub fn load(
        tower_path: &Path,
        runtime_path: &Path,
        interface_override: Option<&str>,
    ) -> Result<Config, ConfigError> {
        let runtime = runtime::load_runtime_config(runtime_path, interface_override);
        let towers = towers::load_tower_map(tower_path);

        match (runtime, towers) {
            (Ok(runtime), Ok(towers)) => Ok(Config { towers, runtime }),
            (runtime, towers) => {
                let violations = [runtime.err(), towers.err()]
                    .into_iter()
                    .flatten()
                    .flat_map(ConfigError::into_violations)
                    .collect();
                Err(ConfigError::Invalid(violations))
            }
        }
    }
}
