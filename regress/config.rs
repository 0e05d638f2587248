use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::encode::EncoderConfig;
use crate::penalized::{LambdaGrid, PathConfig};
use crate::subset::SubsetConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a report run depends on. Every field has a default, so a TOML
/// file only needs to name the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Share of records assigned to training.
    pub split_fraction: f64,
    /// Seeds the split and every fold assignment.
    pub seed: u64,
    pub encoder: EncoderConfig,
    pub subset: SubsetConfig,
    /// Shared by ridge, lasso and the elastic-net sweep.
    pub penalized: PathConfig,
    pub elastic_net_alphas: Vec<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            split_fraction: 0.7,
            seed: 311,
            encoder: EncoderConfig::default(),
            subset: SubsetConfig::default(),
            penalized: PathConfig::default(),
            elastic_net_alphas: vec![0.0, 0.25, 0.5, 0.75, 1.0],
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no family could run with. Model-specific problems
    /// that only some designs trigger are left to the fitters, and the split
    /// fraction is checked by the splitter so it keeps its own error type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));

        if self.subset.max_size == 0 {
            return invalid("subset.max_size must be at least 1".to_string());
        }
        if self.subset.folds < 2 || self.penalized.folds < 2 {
            return invalid(format!(
                "cross-validation needs at least 2 folds (subset.folds = {}, penalized.folds = {})",
                self.subset.folds, self.penalized.folds
            ));
        }
        if self.subset.repeats == 0 {
            return invalid("subset.repeats must be at least 1".to_string());
        }
        if !(self.penalized.tolerance > 0.0) || self.penalized.max_passes == 0 {
            return invalid(format!(
                "penalized.tolerance must be positive and penalized.max_passes non-zero (tolerance = {}, max_passes = {})",
                self.penalized.tolerance, self.penalized.max_passes
            ));
        }
        if let LambdaGrid::Auto { count, min_ratio } = self.penalized.grid {
            if count == 0 || !(min_ratio > 0.0 && min_ratio < 1.0) {
                return invalid(format!(
                    "automatic lambda grid needs count >= 1 and 0 < min_ratio < 1 (count = {count}, min_ratio = {min_ratio})"
                ));
            }
        }
        if self.elastic_net_alphas.is_empty() {
            return invalid("elastic_net_alphas must not be empty".to_string());
        }
        if let Some(alpha) = self
            .elastic_net_alphas
            .iter()
            .find(|a| !(0.0..=1.0).contains(*a))
        {
            return invalid(format!("elastic_net_alphas must lie in [0, 1], found {alpha}"));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, 311);
        assert_eq!(config.subset.max_size, 7);
        assert_eq!(config.elastic_net_alphas.len(), 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "seed = 7\n\n[subset]\nmax_size = 4\n\n[encoder.reference_levels]\nsmoker = \"yes\"\n\n[penalized.grid]\nkind = \"explicit\"\nvalues = [1.0, 0.1]"
        )
        .unwrap();

        let config = PipelineConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.split_fraction, 0.7);
        assert_eq!(config.subset.max_size, 4);
        assert_eq!(config.subset.repeats, 3);
        assert_eq!(
            config.encoder.reference_levels.get("smoker").map(String::as_str),
            Some("yes")
        );
        assert_eq!(
            config.penalized.grid,
            LambdaGrid::Explicit {
                values: vec![1.0, 0.1]
            }
        );
        assert_eq!(config.penalized.folds, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut config = PipelineConfig {
            elastic_net_alphas: vec![0.5, 1.2],
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.elastic_net_alphas = Vec::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.elastic_net_alphas = vec![1.0];
        config.penalized.folds = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // The splitter reports a bad fraction with its own error type.
        config.penalized.folds = 10;
        config.split_fraction = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "seed = \"not a number\"").unwrap();
        assert!(matches!(
            PipelineConfig::load(file.path().to_str().unwrap()),
            Err(ConfigError::TomlParseError(_))
        ));
    }
}
