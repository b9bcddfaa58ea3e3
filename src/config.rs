//! Bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handles::MAX_HANDLES;

/// Runtime configuration for a [`Bridge`](crate::Bridge).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```
/// let config = cvbridge::BridgeConfig::from_toml_str("capacity = 64")?;
/// assert_eq!(config.capacity, 64);
/// assert_eq!(config.jpeg_quality, 80);
/// # Ok::<(), cvbridge::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of live handles (at most 1000).
    pub capacity: usize,
    /// Where temporary copies of bundled resources are written.
    pub cache_dir: PathBuf,
    /// Classifier file used when the requested one does not exist.
    pub fallback_classifier: Option<PathBuf>,
    /// JPEG encoder quality, 1..=100.
    pub jpeg_quality: u8,
    /// `tracing` filter directive used by [`init_with_config`](crate::init_with_config).
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_HANDLES,
            cache_dir: std::env::temp_dir().join("cvbridge"),
            fallback_classifier: None,
            jpeg_quality: 80,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("config file {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_HANDLES {
            return Err(Error::invalid(format!(
                "capacity must be between 1 and {}, got {}",
                MAX_HANDLES, self.capacity
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::invalid(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.log_filter.trim().is_empty() {
            return Err(Error::invalid("log_filter must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.jpeg_quality, 80);
        assert!(config.fallback_classifier.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            capacity = 10
            cache_dir = "/tmp/cv"
            fallback_classifier = "/opt/cascade.xml"
            log_filter = "cvbridge=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cv"));
        assert_eq!(
            config.fallback_classifier,
            Some(PathBuf::from("/opt/cascade.xml"))
        );
        assert_eq!(config.log_filter, "cvbridge=debug");
    }

    #[test]
    fn test_config_validation_capacity() {
        let err = BridgeConfig::from_toml_str("capacity = 1001").unwrap_err();
        assert!(err.is_invalid_parameter());
        let err = BridgeConfig::from_toml_str("capacity = 0").unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_config_validation_quality() {
        let mut config = BridgeConfig::default();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.jpeg_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_malformed() {
        assert!(BridgeConfig::from_toml_str("capacity = \"many\"").is_err());
    }

    #[test]
    fn test_config_missing_file() {
        let err = BridgeConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.is_not_found());
    }
}
