//! Pipeline strategy selection.
//!
//! This module turns an [`AlgorithmVariant`] plus a [`LearnerConfig`] into a
//! [`PipelineDescription`]: the ordered preprocessing and training stages the
//! backend will fit. Assembling the description is kept apart from executing
//! it, so pipeline shape can be inspected and tested without fitting anything.
//!
//! # Variants
//!
//! | Variant | Stages |
//! |---------|--------|
//! | [`TextPipeline`](AlgorithmVariant::TextPipeline) | `Featurize(input → "Features")`, `Train(LogisticRegressionBinary)` |
//! | [`GradientBoostRegression`](AlgorithmVariant::GradientBoostRegression) | `Concatenate(fields → features)` unless features are declared, `Train(GradientBoostedTreeRegression)` |
//!
//! # Example
//!
//! ```
//! use intent_learning::{FieldDescriptor, LearnerConfig, Record, RecordSchema, Stage, select_pipeline};
//!
//! struct Review { label: bool, text: String }
//!
//! impl Record for Review {
//!     fn schema() -> RecordSchema<Self> {
//!         RecordSchema::new("Review")
//!             .field(FieldDescriptor::boolean("Label", |r: &Review| r.label))
//!             .field(FieldDescriptor::text("Text", |r: &Review| r.text.clone()))
//!     }
//! }
//!
//! let pipeline = select_pipeline::<Review>(&LearnerConfig::default()).unwrap();
//! assert!(matches!(pipeline.stages()[0], Stage::Featurize { .. }));
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AlgorithmVariant, LearnerConfig};
use crate::error::{IntentError, Result};
use crate::schema::{Record, reflect_field_names};

/// Output column of the text featurizer. Fixed regardless of the
/// configured features column, which only applies to gradient boosting.
pub const TEXT_FEATURES_COLUMN: &str = "Features";

/// The trainer a `Train` stage fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainerKind {
    /// Calibrated binary logistic regression.
    LogisticRegressionBinary,
    /// Gradient boosted regression trees.
    GradientBoostedTreeRegression,
}

impl TrainerKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainerKind::LogisticRegressionBinary => "logistic_regression_binary",
            TrainerKind::GradientBoostedTreeRegression => "gradient_boosted_tree_regression",
        }
    }

    /// Whether the trainer produces a calibrated binary classifier.
    #[must_use]
    pub fn is_binary_classifier(&self) -> bool {
        matches!(self, TrainerKind::LogisticRegressionBinary)
    }
}

/// Hyperparameters of the gradient boosted tree trainer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostOptions {
    pub num_iterations: u32,
    pub learning_rate: f32,
    pub num_leaves: u32,
    pub min_examples_per_leaf: u32,
    pub use_categorical_split: bool,
    pub handle_missing_value: bool,
    pub use_zero_as_missing_value: bool,
    pub min_examples_per_group: u32,
    pub max_categorical_split_points: u32,
    pub categorical_smoothing: f32,
    pub l2_categorical_regularization: f32,
    pub l1_regularization: f32,
    pub l2_regularization: f32,
}

impl GradientBoostOptions {
    /// The fixed, once-tuned policy used for every gradient boosting run.
    pub const TUNED: GradientBoostOptions = GradientBoostOptions {
        num_iterations: 100,
        learning_rate: 0.322_768_2,
        num_leaves: 55,
        min_examples_per_leaf: 10,
        use_categorical_split: false,
        handle_missing_value: true,
        use_zero_as_missing_value: false,
        min_examples_per_group: 50,
        max_categorical_split_points: 32,
        categorical_smoothing: 20.0,
        l2_categorical_regularization: 5.0,
        l1_regularization: 0.5,
        l2_regularization: 0.0,
    };
}

impl Default for GradientBoostOptions {
    fn default() -> Self {
        Self::TUNED
    }
}

/// Hyperparameters attached to a `Train` stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Hyperparameters {
    /// The trainer's own defaults.
    Defaults,
    GradientBoost(GradientBoostOptions),
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Turn a text column into a numeric feature vector.
    Featurize { input: String, output: String },
    /// Combine named fields, in order, into one feature vector.
    Concatenate { inputs: Vec<String>, output: String },
    /// Fit a trainer on a label column and a feature column.
    Train {
        trainer: TrainerKind,
        hyperparameters: Hyperparameters,
        label_column: String,
        feature_column: String,
    },
}

/// An ordered, immutable list of pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    stages: Vec<Stage>,
}

impl PipelineDescription {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The terminal `Train` stage.
    pub fn train_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .rev()
            .find(|s| matches!(s, Stage::Train { .. }))
    }

    pub fn trainer(&self) -> Option<TrainerKind> {
        match self.train_stage() {
            Some(Stage::Train { trainer, .. }) => Some(*trainer),
            _ => None,
        }
    }

    /// Input columns of the `Concatenate` stage, if there is one.
    pub fn concatenated_fields(&self) -> Option<&[String]> {
        self.stages.iter().find_map(|s| match s {
            Stage::Concatenate { inputs, .. } => Some(inputs.as_slice()),
            _ => None,
        })
    }
}

/// Assemble the pipeline for `config.variant`.
///
/// The record schema is consulted only for the gradient boosting variant, and
/// only when features are not declared. The label column is never
/// concatenated into the feature vector.
///
/// # Errors
///
/// Returns [`IntentError::SchemaEmpty`] if `R` has no fields, or no fields
/// other than the label.
pub fn select_pipeline<R: Record>(config: &LearnerConfig) -> Result<PipelineDescription> {
    let features = config.features_column.clone();

    let stages = match config.variant {
        AlgorithmVariant::TextPipeline => vec![
            Stage::Featurize {
                input: config.input_column.clone(),
                output: TEXT_FEATURES_COLUMN.to_string(),
            },
            Stage::Train {
                trainer: TrainerKind::LogisticRegressionBinary,
                hyperparameters: Hyperparameters::Defaults,
                label_column: config.label_column.clone(),
                feature_column: TEXT_FEATURES_COLUMN.to_string(),
            },
        ],
        AlgorithmVariant::GradientBoostRegression => {
            let mut stages = Vec::with_capacity(2);

            if !config.features_declared {
                let inputs: Vec<String> = reflect_field_names::<R>()?
                    .into_iter()
                    .filter(|name| *name != config.label_column && *name != config.score_column)
                    .collect();

                if inputs.is_empty() {
                    return Err(IntentError::SchemaEmpty {
                        record: R::schema().record_name().to_string(),
                    });
                }

                stages.push(Stage::Concatenate {
                    inputs,
                    output: features.clone(),
                });
            }

            stages.push(Stage::Train {
                trainer: TrainerKind::GradientBoostedTreeRegression,
                hyperparameters: Hyperparameters::GradientBoost(GradientBoostOptions::TUNED),
                label_column: config.label_column.clone(),
                feature_column: features,
            });
            stages
        }
    };

    debug!(
        "Assembled {} pipeline with {} stage(s)",
        config.variant,
        stages.len()
    );

    Ok(PipelineDescription { stages })
}
