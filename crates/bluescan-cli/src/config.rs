//! bluescan CLI configuration management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - `bluescan.toml` in the working directory
//! - `<user config dir>/bluescan/config.toml`, or the file given with `--config` instead
//! - Environment variables such as `BLUESCAN_DISCOVERY__ADAPTER=hci1`
//! - Command line arguments

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use bluescan_core::{DiscoveryConfig, OperationMode};

const LOCAL_CONFIG_FILE: &str = "bluescan.toml";
const ENV_PREFIX: &str = "BLUESCAN_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the bluescan CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Discovery session settings
    pub discovery: DiscoveryConfig,

    /// Output and logging settings
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,

    /// Print devices and adapter state as JSON lines
    pub json_output: bool,

    /// File that log lines are appended to, besides stderr
    pub log_file: Option<PathBuf>,
}

/// Values given on the command line, applied over every other layer
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub adapter: Option<String>,
    pub discovery_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub json_output: Option<bool>,
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load defaults, config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(None, ConfigOverrides::default())
    }

    /// Load configuration from a specific file path, over the defaults only
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()));

        Self::extract(figment).map_err(|e| {
            ConfigError::Loading(format!(
                "Failed to load from {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Load every layer, reading `config_file` in place of the user config file
    pub fn load_with_overrides(
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE));

        match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileSystem(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => match Self::default_config_path() {
                Some(path) => figment = figment.merge(Toml::file(path)),
                None => debug!("No user config directory, skipping user config file"),
            },
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(adapter) = overrides.adapter {
            figment = figment.merge(("discovery.adapter", adapter));
        }
        if let Some(timeout) = overrides.discovery_timeout_secs {
            figment = figment.merge(("discovery.discovery_timeout_secs", timeout));
        }
        if let Some(verbose) = overrides.verbose {
            figment = figment.merge(("cli.verbose", verbose));
        }
        if let Some(json) = overrides.json_output {
            figment = figment.merge(("cli.json_output", json));
        }
        if let Some(log_file) = overrides.log_file {
            figment = figment.merge(("cli.log_file", log_file));
        }

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// `<user config dir>/bluescan/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bluescan").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Appending writer for `cli.log_file`, never rotated
    pub fn log_appender(&self) -> Result<Option<RollingFileAppender>, ConfigError> {
        let Some(path) = &self.cli.log_file else {
            return Ok(None);
        };
        let file_name = path.file_name().ok_or_else(|| {
            ConfigError::FileSystem(format!("Log file path has no file name: {}", path.display()))
        })?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name.to_string_lossy())
            .build(&directory)
            .map(Some)
            .map_err(|e| {
                ConfigError::FileSystem(format!("Cannot open log file {}: {}", path.display(), e))
            })
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            discovery: DiscoveryConfig::new()
                .with_adapter("hci0")
                .with_operation_mode(OperationMode::ScanAll),
            cli: CliConfig {
                verbose: false,
                json_output: false,
                log_file: Some(PathBuf::from("bluescan.log")),
            },
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A config file path in a directory of its own
    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("bluescan-{}-{}", name, std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert!(!config.cli.verbose);
        assert!(!config.cli.json_output);
        assert!(config.cli.log_file.is_none());
        assert_eq!(config.discovery.discovery_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.discovery.discovery_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[discovery]"));
        assert!(example.contains("[cli]"));
        assert!(example.contains("adapter = \"hci0\""));
        assert!(example.contains("operation_mode = \"scan-all\""));
        assert!(example.contains("log_file = \"bluescan.log\""));
    }

    #[test]
    fn test_file_round_trip_and_partial_files() {
        let path = temp_config_path("full");
        let mut config = AppConfig::default();
        config.discovery.adapter = Some("hci1".to_string());
        config.discovery.discovery_timeout_secs = 12;
        config.cli.json_output = true;
        config.save_to_file(&path).unwrap();

        assert_eq!(AppConfig::load_from_file(&path).unwrap(), config);

        let partial = temp_config_path("partial");
        std::fs::create_dir_all(partial.parent().unwrap()).unwrap();
        std::fs::write(&partial, "[discovery]\ndiscovery_timeout_secs = 7\n").unwrap();
        let loaded = AppConfig::load_from_file(&partial).unwrap();
        assert_eq!(loaded.discovery.discovery_timeout_secs, 7);
        assert!(loaded.discovery.adapter.is_none());
        assert!(!loaded.cli.verbose);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
        let _ = std::fs::remove_dir_all(partial.parent().unwrap());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let path = temp_config_path("override");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[discovery]\nadapter = \"hci1\"\ndiscovery_timeout_secs = 7\n")
            .unwrap();

        let config = AppConfig::load_with_overrides(
            Some(&path),
            ConfigOverrides {
                adapter: Some("hci2".to_string()),
                verbose: Some(true),
                log_file: Some(PathBuf::from("/var/log/bluescan.log")),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.discovery.adapter.as_deref(), Some("hci2"));
        assert_eq!(config.discovery.discovery_timeout_secs, 7);
        assert!(config.cli.verbose);
        assert_eq!(
            config.cli.log_file.as_deref(),
            Some(Path::new("/var/log/bluescan.log"))
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_log_appender_opens_configured_file() {
        let mut config = AppConfig::default();
        assert!(config.log_appender().unwrap().is_none());

        let path = temp_config_path("log").with_file_name("bluescan.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        config.cli.log_file = Some(path.clone());
        assert!(config.log_appender().unwrap().is_some());
        assert!(path.exists());

        config.cli.log_file = Some(PathBuf::from("/"));
        assert!(matches!(
            config.log_appender(),
            Err(ConfigError::FileSystem(_))
        ));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let missing = temp_config_path("missing");
        let err = AppConfig::load_with_overrides(Some(&missing), ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileSystem(_)));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let err = AppConfig::load_with_overrides(
            None,
            ConfigOverrides {
                discovery_timeout_secs: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
