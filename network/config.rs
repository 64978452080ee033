//! # Analysis Configuration
//!
//! Every tunable constant of the analysis lives in [`AnalysisConfig`]. The
//! defaults describe the bodyfat study (252 men, two responses, twelve body
//! measurements); a TOML file can override any subset of fields.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Variable '{0}' is listed more than once.")]
    DuplicateVariable(String),
}

/// A column computed once as `scale * source + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub source: String,
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl DerivedColumn {
    pub fn affine(name: &str, source: &str, scale: f64) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            scale,
            offset: 0.0,
        }
    }
}

/// Complexity penalty of the BIC score. Each free parameter costs
/// `multiplier * ln(N) / 2 + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BicPenalty {
    pub multiplier: f64,
    pub offset: f64,
}

impl Default for BicPenalty {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

impl BicPenalty {
    pub fn per_parameter(&self, n_samples: usize) -> f64 {
        self.multiplier * (n_samples as f64).ln() / 2.0 + self.offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub responses: Vec<String>,
    pub covariates: Vec<String>,
    pub derived: Vec<DerivedColumn>,
    /// 1-based row numbers of the raw table to discard.
    pub outlier_rows: Vec<usize>,
    pub separator: char,
    pub split_proportion: f64,
    pub seed: u64,
    pub penalty: BicPenalty,
    pub precision_threshold: f64,
    /// Largest acceptable condition number of an evidence covariance block.
    pub condition_limit: f64,
    pub max_search_iterations: Option<usize>,
    pub mandatory_edges: Vec<(String, String)>,
    pub forbidden_edges: Vec<(String, String)>,
    pub forbid_responses_as_covariate_parents: bool,
    pub example_evidence: Option<BTreeMap<String, f64>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let covariates = [
            "Wkg", "Hcm", "Neck", "Chest", "Abdomen", "Hip", "Thigh", "Knee", "Ankle", "Biceps",
            "Forearm", "Wrist",
        ];
        Self {
            responses: vec!["BodyFat".to_string(), "Density".to_string()],
            covariates: covariates.iter().map(|s| s.to_string()).collect(),
            derived: vec![
                DerivedColumn::affine("Wkg", "Weight", 0.45359237),
                DerivedColumn::affine("Hcm", "Height", 2.54),
            ],
            outlier_rows: vec![39, 42],
            separator: ',',
            split_proportion: 0.6,
            seed: 2024,
            penalty: BicPenalty::default(),
            precision_threshold: 1e-4,
            condition_limit: 1e12,
            max_search_iterations: None,
            mandatory_edges: Vec::new(),
            forbidden_edges: Vec::new(),
            forbid_responses_as_covariate_parents: true,
            example_evidence: None,
        }
    }
}

impl AnalysisConfig {
    /// Loads a configuration from TOML. Missing fields take their defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.split_proportion > 0.0 && self.split_proportion < 1.0) {
            return Err(ConfigError::Invalid {
                field: "split_proportion",
                reason: format!("must lie strictly between 0 and 1, got {}", self.split_proportion),
            });
        }
        if !self.precision_threshold.is_finite() || self.precision_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                field: "precision_threshold",
                reason: format!("must be finite and non-negative, got {}", self.precision_threshold),
            });
        }
        if !(self.condition_limit > 1.0) {
            return Err(ConfigError::Invalid {
                field: "condition_limit",
                reason: format!("must exceed 1, got {}", self.condition_limit),
            });
        }
        if !self.separator.is_ascii() {
            return Err(ConfigError::Invalid {
                field: "separator",
                reason: format!("must be a single ASCII character, got '{}'", self.separator),
            });
        }
        if !self.penalty.multiplier.is_finite() || !self.penalty.offset.is_finite() {
            return Err(ConfigError::Invalid {
                field: "penalty",
                reason: "multiplier and offset must be finite".to_string(),
            });
        }
        if self.responses.is_empty() {
            return Err(ConfigError::Invalid {
                field: "responses",
                reason: "at least one response variable is required".to_string(),
            });
        }
        if self.covariates.is_empty() {
            return Err(ConfigError::Invalid {
                field: "covariates",
                reason: "at least one covariate is required".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for name in self.variables() {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateVariable(name));
            }
        }
        Ok(())
    }

    /// Covariates followed by responses. This order fixes node indices.
    pub fn variables(&self) -> Vec<String> {
        self.covariates
            .iter()
            .chain(self.responses.iter())
            .cloned()
            .collect()
    }

    /// The configured forbidden edges, plus every response -> covariate edge
    /// when `forbid_responses_as_covariate_parents` is set.
    pub fn effective_forbidden_edges(&self) -> Vec<(String, String)> {
        let mut edges = self.forbidden_edges.clone();
        if self.forbid_responses_as_covariate_parents {
            for response in &self.responses {
                for covariate in &self.covariates {
                    let edge = (response.clone(), covariate.clone());
                    if !edges.contains(&edge) {
                        edges.push(edge);
                    }
                }
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.covariates.len(), 12);
        assert_eq!(config.responses.len(), 2);
        assert_eq!(config.variables().len(), 14);
        assert_eq!(config.variables()[0], "Wkg");
        assert_eq!(config.variables()[13], "Density");
    }

    #[test]
    fn test_penalty_per_parameter() {
        let penalty = BicPenalty {
            multiplier: 1.0,
            offset: 0.5,
        };
        assert_abs_diff_eq!(
            penalty.per_parameter(150),
            (150.0_f64).ln() / 2.0 + 0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
split_proportion = 0.7
seed = 7
mandatory_edges = [["Abdomen", "BodyFat"]]

[penalty]
offset = 2.0
"#
        )
        .unwrap();
        let config = AnalysisConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_abs_diff_eq!(config.split_proportion, 0.7, epsilon = 1e-12);
        assert_eq!(config.seed, 7);
        assert_eq!(
            config.mandatory_edges,
            vec![("Abdomen".to_string(), "BodyFat".to_string())]
        );
        assert_abs_diff_eq!(config.penalty.offset, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(config.penalty.multiplier, 1.0, epsilon = 1e-12);
        assert_eq!(config.outlier_rows, vec![39, 42]);
    }

    #[test]
    fn test_invalid_split_is_rejected() {
        let config = AnalysisConfig {
            split_proportion: 1.0,
            ..AnalysisConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "split_proportion"),
            other => panic!("Expected Invalid(split_proportion), got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_variable_is_rejected() {
        let config = AnalysisConfig {
            responses: vec!["Neck".to_string()],
            ..AnalysisConfig::default()
        };
        match config.validate() {
            Err(ConfigError::DuplicateVariable(name)) => assert_eq!(name, "Neck"),
            other => panic!("Expected DuplicateVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_response_parents_of_covariates_are_forbidden() {
        let config = AnalysisConfig::default();
        let forbidden = config.effective_forbidden_edges();
        assert_eq!(forbidden.len(), 24);
        assert!(forbidden.contains(&("BodyFat".to_string(), "Abdomen".to_string())));
        assert!(!forbidden.contains(&("Abdomen".to_string(), "BodyFat".to_string())));
    }
}
