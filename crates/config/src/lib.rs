// Configuration Management
//
// This crate handles all configuration loading for the analytics service.
// It provides:
// - Configuration structs and deserialization
// - Environment and file loading logic
// - Default configuration values
//
// This keeps configuration concerns separate from the analytics engine.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration loading interface
impl ApiConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ApiConfig = serde_yaml::from_str(&content)?;
        config.analytics.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from the first YAML file found in the default
    /// locations, or from environment variables when none exists
    pub fn load() -> Result<Self, ConfigError> {
        let config_paths = ["config/config.yaml", "config.yaml", "config/default.yaml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Self::from_env().map_err(ConfigError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 8080\nanalytics:\n  single_flight: true\n  low_stock_threshold: 20"
        )
        .unwrap();

        let config = ApiConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.analytics.single_flight);
        assert_eq!(config.analytics.low_stock_threshold, 20);
        assert_eq!(config.analytics.cache_ttl_secs, 600);
    }

    #[test]
    fn test_load_from_file_rejects_inverted_thresholds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "analytics:\n  low_stock_threshold: 1\n  out_of_stock_threshold: 3"
        )
        .unwrap();

        let err = ApiConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
