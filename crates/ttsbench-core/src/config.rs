//! Benchmark configuration.
//!
//! Resolution order: built-in defaults (platform directories), then an
//! optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{LoadOptions, DEFAULT_PROVIDER};
use crate::error::{BenchError, BenchResult};
use crate::hub::{DEFAULT_HUB_ENDPOINT, DEFAULT_USER_AGENT};
use crate::result::DeviceInfo;

/// Overrides the models root
pub const ENV_MODELS_DIR: &str = "TTSBENCH_MODELS_DIR";
/// Overrides the exports root
pub const ENV_EXPORTS_DIR: &str = "TTSBENCH_EXPORTS_DIR";
/// Overrides the hub endpoint, as understood by other hub tooling
pub const ENV_HUB_ENDPOINT: &str = "HF_ENDPOINT";

const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_DEFAULT_THREADS: usize = 4;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("ai", "ttsbench", "ttsbench")
}

/// Physical core count, capped at four
#[must_use]
pub fn default_threads() -> u32 {
    let cores = num_cpus::get_physical().clamp(1, MAX_DEFAULT_THREADS);
    u32::try_from(cores).unwrap_or(1)
}

/// Values replacing the detected host description in result records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOverrides {
    /// Hardware model
    pub model: Option<String>,
    /// Vendor
    pub manufacturer: Option<String>,
    /// Operating system / SDK level
    pub sdk: Option<String>,
}

/// Paths and defaults shared by every command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Root holding one directory per downloaded model
    pub models_dir: PathBuf,
    /// Root benchmark runs are exported under
    pub exports_dir: PathBuf,
    /// Model catalog JSON
    pub catalog_path: PathBuf,
    /// Model hub base URL
    pub hub_endpoint: String,
    /// User agent for hub requests
    pub user_agent: String,
    /// Default inference threads
    pub threads: u32,
    /// Default execution provider
    pub provider: String,
    /// Host description overrides
    pub device: DeviceOverrides,
}

impl Default for BenchConfig {
    fn default() -> Self {
        let (data, config) = project_dirs().map_or_else(
            || (PathBuf::from("ttsbench-data"), PathBuf::from("ttsbench-data")),
            |dirs| (dirs.data_dir().to_path_buf(), dirs.config_dir().to_path_buf()),
        );
        Self {
            models_dir: data.join("models"),
            exports_dir: data.join("exports"),
            catalog_path: config.join("catalog.json"),
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            threads: default_threads(),
            provider: DEFAULT_PROVIDER.to_string(),
            device: DeviceOverrides::default(),
        }
    }
}

impl BenchConfig {
    /// Default location of the config file, if the platform has one
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Parse a TOML document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML or invalid values.
    pub fn from_toml_str(content: &str) -> BenchResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist; without one the platform config file is
    /// read when present. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error when an explicit file is missing, any file is invalid,
    /// or the final values fail validation.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let file = match path {
            Some(p) if !p.is_file() => {
                return Err(BenchError::configuration(format!(
                    "config file {} does not exist",
                    p.display()
                )))
            }
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.is_file()),
        };

        let mut config = match &file {
            Some(p) => {
                info!("Loading config from {}", p.display());
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content)?
            }
            None => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = non_empty(ENV_MODELS_DIR) {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(ENV_EXPORTS_DIR) {
            self.exports_dir = PathBuf::from(dir);
        }
        if let Some(endpoint) = non_empty(ENV_HUB_ENDPOINT) {
            self.hub_endpoint = endpoint;
        }
    }

    /// Check values that would only fail later
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending key.
    pub fn validate(&self) -> BenchResult<()> {
        if self.hub_endpoint.trim().is_empty() {
            return Err(BenchError::configuration("hub_endpoint must not be empty"));
        }
        if !self.hub_endpoint.starts_with("http://") && !self.hub_endpoint.starts_with("https://") {
            return Err(BenchError::configuration(format!(
                "hub_endpoint must be an http(s) URL, got '{}'",
                self.hub_endpoint
            )));
        }
        if self.threads == 0 {
            return Err(BenchError::configuration("threads must be at least 1"));
        }
        if self.provider.trim().is_empty() {
            return Err(BenchError::configuration("provider must not be empty"));
        }
        Ok(())
    }

    /// Default engine load options
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            threads: self.threads,
            provider: self.provider.clone(),
        }
    }

    /// Detected host with configured overrides applied
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        let detected = DeviceInfo::detect();
        DeviceInfo {
            model: self.device.model.clone().unwrap_or(detected.model),
            manufacturer: self.device.manufacturer.clone().unwrap_or(detected.manufacturer),
            sdk: self.device.sdk.clone().unwrap_or(detected.sdk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert!((1..=4).contains(&config.threads));
        assert_eq!(config.provider, "cpu");
        assert_eq!(config.hub_endpoint, DEFAULT_HUB_ENDPOINT);
    }

    #[test]
    fn test_partial_toml() {
        let config = BenchConfig::from_toml_str(
            r#"
            models_dir = "/data/models"
            threads = 2

            [device]
            model = "Pixel 8"
            "#,
        )
        .unwrap();
        assert_eq!(config.models_dir, PathBuf::from("/data/models"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.load_options().threads, 2);
        assert_eq!(config.device_info().model, "Pixel 8");
        assert_eq!(config.device_info().sdk, std::env::consts::OS);
    }

    #[test]
    fn test_invalid_values() {
        assert!(BenchConfig::from_toml_str("threads = 0").is_err());
        assert!(BenchConfig::from_toml_str("hub_endpoint = \"\"").is_err());
        assert!(BenchConfig::from_toml_str("hub_endpoint = \"ftp://x\"").is_err());
        assert!(matches!(
            BenchConfig::from_toml_str("threads = \"many\"").unwrap_err(),
            BenchError::ConfigurationError { .. }
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = BenchConfig::default();
        config.apply_overrides(|key| match key {
            ENV_MODELS_DIR => Some("/m".into()),
            ENV_HUB_ENDPOINT => Some("http://mirror.local".into()),
            ENV_EXPORTS_DIR => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.models_dir, PathBuf::from("/m"));
        assert_eq!(config.hub_endpoint, "http://mirror.local");
        assert_ne!(config.exports_dir, PathBuf::from("  "));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = BenchConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, BenchError::ConfigurationError { .. }));
    }
}
