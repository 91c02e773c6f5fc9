//! Learner configuration.
//!
//! This module provides [`LearnerConfig`], its builder, and the
//! [`AlgorithmVariant`] tag that selects which pipeline gets assembled.
//!
//! # Example
//!
//! ```
//! use intent_learning::{AlgorithmVariant, LearnerConfig};
//!
//! let config = LearnerConfig::builder()
//!     .variant(AlgorithmVariant::GradientBoostRegression)
//!     .label_column("Label")
//!     .artifact_name("house_prices.model")
//!     .build()
//!     .expect("valid config");
//!
//! assert!(!config.features_declared);
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::IntentError;

/// The algorithm family a learner trains.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum AlgorithmVariant {
    /// Binary text classification: featurize one text column, then logistic
    /// regression.
    #[default]
    TextPipeline,

    /// Regression with gradient boosted trees over numeric fields.
    GradientBoostRegression,
}

impl AlgorithmVariant {
    /// Returns the canonical tag.
    ///
    /// ```
    /// use intent_learning::AlgorithmVariant;
    ///
    /// assert_eq!(AlgorithmVariant::TextPipeline.as_str(), "text_pipeline");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmVariant::TextPipeline => "text_pipeline",
            AlgorithmVariant::GradientBoostRegression => "gradient_boost_regression",
        }
    }
}

impl std::fmt::Display for AlgorithmVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmVariant {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text_pipeline" | "text_featurizing" => Ok(AlgorithmVariant::TextPipeline),
            "gradient_boost_regression" | "gbdt" | "lightgbm" => {
                Ok(AlgorithmVariant::GradientBoostRegression)
            }
            _ => Err(IntentError::UnsupportedVariant(s.to_string())),
        }
    }
}

/// Configuration for a [`Learner`](crate::Learner).
///
/// Use [`LearnerConfig::builder()`] to construct one. The value is immutable
/// once built; a learner never observes configuration changes after training.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerConfig {
    /// Column holding the training label (default `"Label"`).
    pub label_column: String,

    /// Text column featurized by the text variant (default `"Text"`).
    pub input_column: String,

    /// Score column name (default `"Score"`).
    pub score_column: String,

    /// Feature vector column name (default `"Features"`).
    pub features_column: String,

    /// Whether the records already carry a feature vector.
    ///
    /// Once `true`, the record schema is never consulted to derive features.
    pub features_declared: bool,

    /// Name of the persisted model artifact (default `"_model"`).
    pub artifact_name: String,

    /// Algorithm family (default [`AlgorithmVariant::TextPipeline`]).
    pub variant: AlgorithmVariant,

    /// Directory artifact names are resolved against (default `.`).
    pub artifact_dir: PathBuf,

    /// Seed for stochastic trainers (default 42).
    pub random_seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            label_column: "Label".to_string(),
            input_column: "Text".to_string(),
            score_column: "Score".to_string(),
            features_column: "Features".to_string(),
            features_declared: false,
            artifact_name: "_model".to_string(),
            variant: AlgorithmVariant::default(),
            artifact_dir: PathBuf::from("."),
            random_seed: 42,
        }
    }
}

impl LearnerConfig {
    #[must_use]
    pub fn builder() -> LearnerConfigBuilder {
        LearnerConfigBuilder::default()
    }
}

/// Builder for [`LearnerConfig`].
#[derive(Debug, Clone, Default)]
pub struct LearnerConfigBuilder {
    config: LearnerConfig,
}

impl LearnerConfigBuilder {
    /// Set the label column.
    #[must_use]
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.config.label_column = column.into();
        self
    }

    /// Set the text input column.
    #[must_use]
    pub fn input_column(mut self, column: impl Into<String>) -> Self {
        self.config.input_column = column.into();
        self
    }

    /// Set the score column.
    #[must_use]
    pub fn score_column(mut self, column: impl Into<String>) -> Self {
        self.config.score_column = column.into();
        self
    }

    /// Set the features column and mark features as declared.
    #[must_use]
    pub fn features_column(mut self, column: impl Into<String>) -> Self {
        self.config.features_column = column.into();
        self.config.features_declared = true;
        self
    }

    /// Mark features as declared without renaming the column.
    #[must_use]
    pub fn including_features(mut self) -> Self {
        self.config.features_declared = true;
        self
    }

    #[must_use]
    pub fn artifact_name(mut self, name: impl Into<String>) -> Self {
        self.config.artifact_name = name.into();
        self
    }

    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = dir.into();
        self
    }

    #[must_use]
    pub fn variant(mut self, variant: AlgorithmVariant) -> Self {
        self.config.variant = variant;
        self
    }

    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::InvalidConfig`] if any column name or the
    /// artifact name is empty, or if the score column would overwrite the
    /// label column.
    pub fn build(self) -> Result<LearnerConfig, IntentError> {
        let columns = [
            ("label_column", &self.config.label_column),
            ("input_column", &self.config.input_column),
            ("score_column", &self.config.score_column),
            ("features_column", &self.config.features_column),
            ("artifact_name", &self.config.artifact_name),
        ];

        for (setting, value) in columns {
            if value.trim().is_empty() {
                return Err(IntentError::InvalidConfig(format!(
                    "{setting} must not be empty"
                )));
            }
        }

        if self.config.score_column == self.config.label_column {
            return Err(IntentError::InvalidConfig(format!(
                "score_column and label_column are both '{}'",
                self.config.label_column
            )));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LearnerConfig::default();
        assert_eq!(config.label_column, "Label");
        assert_eq!(config.input_column, "Text");
        assert_eq!(config.score_column, "Score");
        assert_eq!(config.features_column, "Features");
        assert!(!config.features_declared);
        assert_eq!(config.artifact_name, "_model");
        assert_eq!(config.variant, AlgorithmVariant::TextPipeline);
    }

    #[test]
    fn test_features_column_declares_features() {
        let config = LearnerConfig::builder()
            .features_column("Vec")
            .build()
            .unwrap();
        assert!(config.features_declared);
        assert_eq!(config.features_column, "Vec");

        let config = LearnerConfig::builder().including_features().build().unwrap();
        assert!(config.features_declared);
        assert_eq!(config.features_column, "Features");
    }

    #[test]
    fn test_empty_names_rejected() {
        let err = LearnerConfig::builder().label_column("").build().unwrap_err();
        assert!(err.to_string().contains("label_column"));

        let err = LearnerConfig::builder().artifact_name("  ").build().unwrap_err();
        assert!(err.to_string().contains("artifact_name"));
    }

    #[test]
    fn test_score_must_not_overwrite_label() {
        let err = LearnerConfig::builder()
            .score_column("Label")
            .build()
            .unwrap_err();
        assert!(matches!(err, IntentError::InvalidConfig(_)));

        let config = LearnerConfig::builder().score_column("Prob").build().unwrap();
        assert_eq!(config.score_column, "Prob");
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!(
            "text".parse::<AlgorithmVariant>().unwrap(),
            AlgorithmVariant::TextPipeline
        );
        assert_eq!(
            "LightGbm".parse::<AlgorithmVariant>().unwrap(),
            AlgorithmVariant::GradientBoostRegression
        );

        let err = "random_forest".parse::<AlgorithmVariant>().unwrap_err();
        assert!(matches!(err, IntentError::UnsupportedVariant(ref tag) if tag == "random_forest"));
    }

    #[test]
    fn test_variant_roundtrip() {
        for variant in [
            AlgorithmVariant::TextPipeline,
            AlgorithmVariant::GradientBoostRegression,
        ] {
            assert_eq!(variant.as_str().parse::<AlgorithmVariant>().unwrap(), variant);
        }
    }
}
