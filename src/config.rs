//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/bucketsolve/bucketsolve.toml`
//! 3. Local config: `./.bucketsolve.toml`, or the file given with `--config`
//! 4. Environment variables: `BUCKETSOLVE_*` prefix
//!
//! Command line flags are applied on top by the CLI.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::builder::DEFAULT_RATIO_TOLERANCE;
use crate::domain::solver::{Strategy, DEFAULT_STEP_SIZE};

pub const APP_NAME: &str = "bucketsolve";
pub const LOCAL_CONFIG_FILE: &str = ".bucketsolve.toml";
pub const ENV_PREFIX: &str = "BUCKETSOLVE";

/// Raw settings for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RawSettings {
    pub strategy: Option<Strategy>,
    pub step_size: Option<f64>,
    pub max_iterations: Option<u64>,
    pub seed: Option<u64>,
    pub ratio_tolerance: Option<f64>,
    pub normalize_ratios: Option<bool>,
    pub input: Option<PathBuf>,
}

/// Unified configuration for bucketsolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Allocation strategy
    pub strategy: Strategy,
    /// Monte Carlo step
    pub step_size: f64,
    /// Monte Carlo iteration budget per sibling set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    /// Monte Carlo seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Allowed deviation of sibling ratio sums from 1
    pub ratio_tolerance: f64,
    /// Rescale sibling ratios to sum to 1 instead of rejecting them
    pub normalize_ratios: bool,
    /// Input file used when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            step_size: DEFAULT_STEP_SIZE,
            max_iterations: None,
            seed: None,
            ratio_tolerance: DEFAULT_RATIO_TOLERANCE,
            normalize_ratios: false,
            input: None,
        }
    }
}

/// Get the XDG config directory for bucketsolve.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{}.toml", APP_NAME)))
}

/// Get the path to the local config file in `dir`.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(LOCAL_CONFIG_FILE)
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand `~`, `$VAR` and `${VAR}` in the input path.
    fn expand_paths(&mut self) -> Result<(), ApplicationError> {
        if let Some(input) = &self.input {
            let raw = input.to_string_lossy().into_owned();
            let expanded = shellexpand::full(&raw)
                .map_err(|e| ApplicationError::Config {
                    message: format!("expand input path {}: {}", raw, e),
                })?
                .into_owned();
            self.input = Some(PathBuf::from(expanded));
        }
        Ok(())
    }

    /// Overlay wins where it specifies a value.
    pub fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            strategy: overlay.strategy.unwrap_or(self.strategy),
            step_size: overlay.step_size.unwrap_or(self.step_size),
            max_iterations: overlay.max_iterations.or(self.max_iterations),
            seed: overlay.seed.or(self.seed),
            ratio_tolerance: overlay.ratio_tolerance.unwrap_or(self.ratio_tolerance),
            normalize_ratios: overlay.normalize_ratios.unwrap_or(self.normalize_ratios),
            input: overlay.input.clone().or_else(|| self.input.clone()),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `config_file` replaces the local `.bucketsolve.toml` lookup and must
    /// exist when given.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                debug!("global config: {}", global_path.display());
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ApplicationError::Config {
                        message: format!("config file not found: {}", path.display()),
                    });
                }
                current = current.merge_with(&load_raw_settings(path)?);
            }
            None => {
                let local_path = local_config_path(Path::new("."));
                if local_path.exists() {
                    debug!("local config: {}", local_path.display());
                    current = current.merge_with(&load_raw_settings(&local_path)?);
                }
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths()?;
        current.validate()?;
        Ok(current)
    }

    /// Apply BUCKETSOLVE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("strategy") {
            settings.strategy = val
                .parse()
                .map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_string("step_size") {
            settings.step_size = parse_env("step_size", &val)?;
        }
        if let Ok(val) = config.get_string("max_iterations") {
            settings.max_iterations = Some(parse_env("max_iterations", &val)?);
        }
        if let Ok(val) = config.get_string("seed") {
            settings.seed = Some(parse_env("seed", &val)?);
        }
        if let Ok(val) = config.get_string("ratio_tolerance") {
            settings.ratio_tolerance = parse_env("ratio_tolerance", &val)?;
        }
        if let Ok(val) = config.get_string("normalize_ratios") {
            settings.normalize_ratios = parse_env("normalize_ratios", &val)?;
        }
        if let Ok(val) = config.get_string("input") {
            settings.input = Some(PathBuf::from(val));
        }

        Ok(settings)
    }

    /// Reject values no solve could use.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(ApplicationError::Config {
                message: format!("step_size must be positive, got {}", self.step_size),
            });
        }
        if !self.ratio_tolerance.is_finite() || self.ratio_tolerance < 0.0 {
            return Err(ApplicationError::Config {
                message: format!(
                    "ratio_tolerance must not be negative, got {}",
                    self.ratio_tolerance
                ),
            });
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# bucketsolve configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/bucketsolve/bucketsolve.toml
#   Local:  ./.bucketsolve.toml (or --config <FILE>)
#   Env:    BUCKETSOLVE_* environment variables

# Allocation strategy: unconstrained | constrained | montecarlo
# strategy = "constrained"

# Monte Carlo step, the smallest amount that can be added
# step_size = 0.01

# Monte Carlo iteration budget per sibling set (default: 1000 per step)
# max_iterations = 100000

# Fixed Monte Carlo seed for reproducible runs
# seed = 42

# Allowed deviation of sibling ratio sums from 1
# ratio_tolerance = 1e-6

# Rescale sibling ratios to sum to 1 instead of rejecting the input
# normalize_ratios = false

# Default input file (~ and $VAR are expanded)
# input = "~/finance/buckets.yaml"
"#
        .to_string()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ApplicationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| ApplicationError::Config {
        message: format!("{}_{}='{}': {}", ENV_PREFIX, key.to_uppercase(), value, e),
    })
}

/// Convert config crate errors to ApplicationError.
fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
