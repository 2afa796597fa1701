//! Compiler configuration (ember.toml)

use crate::optimize::OptLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Top-level compiler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Dataflow optimization settings
    pub optimize: OptimizeConfig,

    /// Class elimination settings
    pub lower: LowerConfig,
}

/// `[optimize]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizeConfig {
    /// Optimization level (none, basic, full)
    pub level: OptLevel,

    /// Upper bound on fixpoint rounds per function at `full`
    pub max_rounds: usize,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            level: OptLevel::default(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> usize {
    16
}

/// `[lower]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LowerConfig {
    /// An instanceof test with more ranges than this caches the receiver's
    /// slot value in a temporary
    pub instanceof_cache_threshold: usize,

    /// Name of the global array mapping handles to typeids
    pub typeid_slot_name: String,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self {
            instanceof_cache_threshold: default_instanceof_cache_threshold(),
            typeid_slot_name: default_typeid_slot_name(),
        }
    }
}

fn default_instanceof_cache_threshold() -> usize {
    1
}

fn default_typeid_slot_name() -> String {
    "typeId".to_string()
}

impl CompilerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.optimize.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "optimize.max_rounds must be at least 1".to_string(),
            ));
        }
        let name = &self.lower.typeid_slot_name;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::ValidationError(format!(
                "lower.typeid_slot_name `{}` is not a valid identifier",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CompilerConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.lower.typeid_slot_name, "typeId");
        assert_eq!(config.optimize.max_rounds, 16);
    }

    #[test]
    fn test_partial_sections() {
        let config = CompilerConfig::from_toml_str(
            r#"
            [optimize]
            level = "full"

            [lower]
            instanceof_cache_threshold = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.optimize.level, OptLevel::Full);
        assert_eq!(config.optimize.max_rounds, 16);
        assert_eq!(config.lower.instanceof_cache_threshold, 4);
        assert_eq!(config.lower.typeid_slot_name, "typeId");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CompilerConfig::from_toml_str("[optimize]\nmax_rounds = 0"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("[lower]\ntypeid_slot_name = \"a b\""),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("[optimize]\nlevel = \"max\""),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ember.toml");
        std::fs::write(&path, "[optimize]\nlevel = \"none\"\n").unwrap();
        let config = CompilerConfig::load(&path).unwrap();
        assert_eq!(config.optimize.level, OptLevel::None);
        assert!(matches!(
            CompilerConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
