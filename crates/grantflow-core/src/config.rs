//! Configuration parsing and validation.
//!
//! Deployment settings are read from a TOML file: the database path, the
//! approval vote threshold, and the EIP-712 signing domain. The domain must
//! match what wallet clients sign against or every signature verification
//! will fail for legitimate users.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Eip712Domain;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML is invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value fails a semantic check.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantsConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Minimum approval votes before final approval becomes available.
    ///
    /// Set to 1 for single-admin deployments, where the final-approve
    /// action itself is the only required endorsement.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: usize,

    /// EIP-712 signing domain.
    #[serde(default = "default_domain")]
    pub domain: Eip712Domain,
}

impl Default for GrantsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            approval_threshold: default_approval_threshold(),
            domain: default_domain(),
        }
    }
}

impl GrantsConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the threshold is zero.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the approval threshold is zero or the
    /// domain name is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.approval_threshold == 0 {
            return Err(ConfigError::Validation(
                "approval_threshold must be at least 1".to_string(),
            ));
        }
        if self.domain.name.is_empty() {
            return Err(ConfigError::Validation(
                "domain.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("grants.db")
}

const fn default_approval_threshold() -> usize {
    2
}

fn default_domain() -> Eip712Domain {
    Eip712Domain {
        name: "Grantflow".to_string(),
        version: "1".to_string(),
        chain_id: 1,
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GrantsConfig::from_toml("").unwrap();
        assert_eq!(config.approval_threshold, 2);
        assert_eq!(config.domain.name, "Grantflow");
        assert_eq!(config.db_path, PathBuf::from("grants.db"));
    }

    #[test]
    fn test_full_roundtrip() {
        let config = GrantsConfig {
            db_path: PathBuf::from("/var/lib/grantflow/grants.db"),
            approval_threshold: 3,
            domain: Eip712Domain {
                name: "Grantflow".to_string(),
                version: "2".to_string(),
                chain_id: 10,
            },
        };
        let toml = config.to_toml().unwrap();
        let back = GrantsConfig::from_toml(&toml).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = GrantsConfig::from_toml("approval_threshold = 0");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = GrantsConfig::from_toml("minimal_votes = 2");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config = GrantsConfig::from_toml(
            r#"
            approval_threshold = 1

            [domain]
            name = "Grantflow"
            version = "1"
            chain_id = 11155111
            "#,
        )
        .unwrap();
        assert_eq!(config.approval_threshold, 1);
        assert_eq!(config.domain.chain_id, 11_155_111);
    }
}
