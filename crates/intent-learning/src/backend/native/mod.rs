//! The built-in ML backend.
//!
//! [`NativeBackend`] fits the two pipeline shapes this crate assembles without
//! any external runtime:
//!
//! - `Featurize` → [`TextFeaturizer`], `Train(LogisticRegressionBinary)` →
//!   [`LogisticModel`]
//! - `Concatenate` (or a declared vector column) →
//!   `Train(GradientBoostedTreeRegression)` → [`BoostedTrees`]
//!
//! Artifacts are JSON documents holding the fitted model, its input schema, a
//! format version and the time of writing.

pub mod gbdt;
pub mod logistic;
pub mod text;

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::table::{f32_column, take_rows, text_column, vector_column};
use crate::backend::{FittedModel, MlBackend, ModelSchema};
use crate::error::{IntentError, Result};
use crate::pipeline::{GradientBoostOptions, Hyperparameters, PipelineDescription, Stage, TrainerKind};
use crate::split::holdout_indices;
use crate::types::{CrossValidationReport, FoldMetric, RawPrediction};

pub use gbdt::BoostedTrees;
pub use logistic::LogisticModel;
pub use text::TextFeaturizer;

use logistic::sigmoid;
use text::SparseRow;

/// Version written into every artifact; reads reject anything else.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Output columns appended by [`MlBackend::transform`] next to the score.
pub const PROBABILITY_COLUMN: &str = "Probability";
pub const PREDICTED_LABEL_COLUMN: &str = "PredictedLabel";

/// How a fitted model turns table columns into feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum FeatureMap {
    Text {
        input: String,
        featurizer: TextFeaturizer,
    },
    Columns {
        inputs: Vec<String>,
    },
    Declared {
        column: String,
    },
}

impl FeatureMap {
    fn extract(&self, table: &DataFrame) -> Result<FeatureRows> {
        match self {
            FeatureMap::Text { input, featurizer } => {
                let rows = text_column(table, input)?
                    .iter()
                    .map(|t| featurizer.transform(t))
                    .collect();
                Ok(FeatureRows::Sparse {
                    rows,
                    width: featurizer.dimension(),
                })
            }
            FeatureMap::Columns { inputs } => {
                let columns = inputs
                    .iter()
                    .map(|name| f32_column(table, name))
                    .collect::<Result<Vec<_>>>()?;
                let rows = (0..table.height())
                    .map(|r| columns.iter().map(|c| c[r]).collect())
                    .collect();
                Ok(FeatureRows::Dense(rows))
            }
            FeatureMap::Declared { column } => Ok(FeatureRows::Dense(vector_column(table, column)?)),
        }
    }
}

enum FeatureRows {
    Sparse { rows: Vec<SparseRow>, width: usize },
    Dense(Vec<Vec<f32>>),
}

impl FeatureRows {
    fn width(&self) -> usize {
        match self {
            FeatureRows::Sparse { width, .. } => *width,
            FeatureRows::Dense(rows) => rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    fn into_sparse(self) -> Vec<SparseRow> {
        match self {
            FeatureRows::Sparse { rows, .. } => rows,
            FeatureRows::Dense(rows) => rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .enumerate()
                        .filter(|(_, v)| *v != 0.0 && v.is_finite())
                        .collect()
                })
                .collect(),
        }
    }

    fn into_dense(self) -> Vec<Vec<f32>> {
        match self {
            FeatureRows::Dense(rows) => rows,
            FeatureRows::Sparse { rows, width } => rows
                .into_iter()
                .map(|row| {
                    let mut dense = vec![0.0; width];
                    for (j, v) in row {
                        if let Some(slot) = dense.get_mut(j) {
                            *slot = v;
                        }
                    }
                    dense
                })
                .collect(),
        }
    }
}

/// The terminal predictor of a fitted pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Predictor {
    Logistic(LogisticModel),
    Boosted(BoostedTrees),
}

impl Predictor {
    pub(crate) fn trainer(&self) -> TrainerKind {
        match self {
            Predictor::Logistic(_) => TrainerKind::LogisticRegressionBinary,
            Predictor::Boosted(_) => TrainerKind::GradientBoostedTreeRegression,
        }
    }

    pub(crate) fn feature_count(&self) -> usize {
        match self {
            Predictor::Logistic(model) => model.width(),
            Predictor::Boosted(model) => model.feature_count(),
        }
    }

    fn predict(&self, rows: FeatureRows) -> Vec<RawPrediction> {
        match self {
            Predictor::Logistic(model) => rows
                .into_sparse()
                .iter()
                .map(|row| {
                    let score = model.score(row);
                    RawPrediction {
                        score,
                        predicted_label: score > 0.0,
                        probability: sigmoid(score),
                    }
                })
                .collect(),
            Predictor::Boosted(model) => rows
                .into_dense()
                .iter()
                .map(|row| {
                    let score = model.predict(row);
                    let probability = score.clamp(0.0, 1.0);
                    RawPrediction {
                        score,
                        predicted_label: probability >= 0.5,
                        probability,
                    }
                })
                .collect(),
        }
    }
}

/// Pure-Rust implementation of [`MlBackend`].
///
/// # Example
///
/// ```
/// use intent_learning::{MlBackend, NativeBackend};
///
/// let backend = NativeBackend::with_seed(7);
/// assert_eq!(backend.name(), "native");
/// assert_eq!(backend.seed(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBackend {
    seed: u64,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl NativeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose stochastic trainers draw from `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn fit_stages(&self, table: &DataFrame, pipeline: &PipelineDescription) -> Result<FittedModel> {
        let Some(Stage::Train {
            trainer,
            hyperparameters,
            label_column,
            feature_column,
        }) = pipeline.train_stage()
        else {
            return Err(IntentError::TrainingFailed(
                "pipeline has no train stage".to_string(),
            ));
        };

        if table.height() == 0 {
            return Err(IntentError::TrainingFailed(
                "cannot fit on an empty table".to_string(),
            ));
        }

        let mut features = FeatureMap::Declared {
            column: feature_column.clone(),
        };
        for stage in pipeline.stages() {
            match stage {
                Stage::Featurize { input, output } if output == feature_column => {
                    let texts = text_column(table, input)?;
                    features = FeatureMap::Text {
                        input: input.clone(),
                        featurizer: TextFeaturizer::fit(&texts),
                    };
                }
                Stage::Concatenate { inputs, output } if output == feature_column => {
                    features = FeatureMap::Columns {
                        inputs: inputs.clone(),
                    };
                }
                _ => {}
            }
        }

        let rows = features.extract(table)?;
        let labels = f32_column(table, label_column)?;

        let predictor = match trainer {
            TrainerKind::LogisticRegressionBinary => {
                let width = rows.width();
                let classes: Vec<bool> = labels.iter().map(|&v| v > 0.5).collect();
                Predictor::Logistic(LogisticModel::fit(
                    &rows.into_sparse(),
                    &classes,
                    width,
                    self.seed,
                )?)
            }
            TrainerKind::GradientBoostedTreeRegression => {
                let options = match hyperparameters {
                    Hyperparameters::GradientBoost(options) => *options,
                    Hyperparameters::Defaults => GradientBoostOptions::TUNED,
                };
                Predictor::Boosted(BoostedTrees::fit(&rows.into_dense(), &labels, &options)?)
            }
        };

        Ok(FittedModel {
            features,
            predictor,
        })
    }

    fn score_fold(
        &self,
        table: &DataFrame,
        pipeline: &PipelineDescription,
        test_rows: &[usize],
        metric: FoldMetric,
        label_column: &str,
    ) -> Result<f64> {
        let train_rows: Vec<usize> = (0..table.height())
            .filter(|r| test_rows.binary_search(r).is_err())
            .collect();

        let model = self.fit(&take_rows(table, &train_rows)?, pipeline)?;
        let test = take_rows(table, test_rows)?;
        let predictions = model.predictor.predict(model.features.extract(&test)?);
        let labels = f32_column(&test, label_column)?;

        let n = predictions.len().max(1) as f64;
        let score = match metric {
            FoldMetric::Accuracy => {
                let correct = predictions
                    .iter()
                    .zip(&labels)
                    .filter(|(p, l)| p.predicted_label == (**l > 0.5))
                    .count();
                correct as f64 / n
            }
            FoldMetric::Rmse => {
                let squared: f64 = predictions
                    .iter()
                    .zip(&labels)
                    .map(|(p, &l)| f64::from(p.score - l).powi(2))
                    .sum();
                (squared / n).sqrt()
            }
        };
        Ok(score)
    }
}

/// Anything but an explicit training failure is reported as one, so callers
/// see a single failure class for the fit step.
fn as_training_failure(err: IntentError) -> IntentError {
    match err {
        e @ IntentError::TrainingFailed(_) => e,
        other => IntentError::TrainingFailed(other.to_string()),
    }
}

fn as_inference_failure(err: IntentError) -> IntentError {
    match err {
        e @ IntentError::InferenceFailed(_) => e,
        other => IntentError::InferenceFailed(other.to_string()),
    }
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    trained_at: DateTime<Utc>,
    backend: &'a str,
    schema: &'a ModelSchema,
    model: &'a FittedModel,
}

#[derive(Deserialize)]
struct ArtifactDocument {
    format_version: u32,
    trained_at: DateTime<Utc>,
    backend: String,
    schema: ModelSchema,
    model: FittedModel,
}

impl MlBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn split(&self, table: &DataFrame, holdout_fraction: f64) -> Result<(DataFrame, DataFrame)> {
        let n = table.height();
        if n == 0 {
            return Err(IntentError::InsufficientData(
                "cannot split an empty table".to_string(),
            ));
        }

        let held = holdout_indices(n, holdout_fraction)?;
        let training: Vec<usize> = (0..n).filter(|r| held.binary_search(r).is_err()).collect();

        Ok((take_rows(table, &training)?, take_rows(table, &held)?))
    }

    fn fit(&self, table: &DataFrame, pipeline: &PipelineDescription) -> Result<FittedModel> {
        self.fit_stages(table, pipeline).map_err(as_training_failure)
    }

    fn transform(
        &self,
        model: &FittedModel,
        table: &DataFrame,
        score_column: &str,
    ) -> Result<DataFrame> {
        let predictions = model.predictor.predict(model.features.extract(table)?);

        let mut scored = table.clone();
        for name in [score_column, PROBABILITY_COLUMN, PREDICTED_LABEL_COLUMN] {
            if scored.get_column_index(name).is_some() {
                scored = scored.drop(name)?;
            }
        }

        let scores: Vec<f32> = predictions.iter().map(|p| p.score).collect();
        let probabilities: Vec<f32> = predictions.iter().map(|p| p.probability).collect();
        let labels: Vec<bool> = predictions.iter().map(|p| p.predicted_label).collect();

        Ok(scored.hstack(&[
            Column::new(score_column.into(), scores),
            Column::new(PROBABILITY_COLUMN.into(), probabilities),
            Column::new(PREDICTED_LABEL_COLUMN.into(), labels),
        ])?)
    }

    fn predict_one(&self, model: &FittedModel, row: &DataFrame) -> Result<RawPrediction> {
        if row.height() != 1 {
            return Err(IntentError::InferenceFailed(format!(
                "expected exactly one row, got {}",
                row.height()
            )));
        }

        let rows = model.features.extract(row).map_err(as_inference_failure)?;
        model
            .predictor
            .predict(rows)
            .into_iter()
            .next()
            .ok_or_else(|| IntentError::InferenceFailed("predictor returned no output".to_string()))
    }

    fn cross_validate(
        &self,
        table: &DataFrame,
        pipeline: &PipelineDescription,
        folds: usize,
    ) -> Result<CrossValidationReport> {
        let n = table.height();
        if folds < 2 || n < folds {
            return Err(IntentError::InsufficientData(format!(
                "{n} rows cannot be split into {folds} folds"
            )));
        }

        let Some(Stage::Train {
            trainer,
            label_column,
            ..
        }) = pipeline.train_stage()
        else {
            return Err(IntentError::TrainingFailed(
                "pipeline has no train stage".to_string(),
            ));
        };
        let metric = if trainer.is_binary_classifier() {
            FoldMetric::Accuracy
        } else {
            FoldMetric::Rmse
        };

        let mut fold_scores = Vec::with_capacity(folds);
        for fold in 0..folds {
            let test_rows: Vec<usize> = (fold * n / folds..(fold + 1) * n / folds).collect();
            let score = self.score_fold(table, pipeline, &test_rows, metric, label_column)?;
            debug!("Fold {}/{}: {:?} = {:.4}", fold + 1, folds, metric, score);
            fold_scores.push(score);
        }

        Ok(CrossValidationReport {
            metric,
            fold_scores,
        })
    }

    fn serialize_model(
        &self,
        model: &FittedModel,
        schema: &ModelSchema,
        writer: &mut dyn Write,
    ) -> Result<()> {
        let document = ArtifactRef {
            format_version: ARTIFACT_FORMAT_VERSION,
            trained_at: Utc::now(),
            backend: self.name(),
            schema,
            model,
        };
        serde_json::to_writer(writer, &document)?;
        Ok(())
    }

    fn deserialize_model(&self, reader: &mut dyn Read) -> Result<(FittedModel, ModelSchema)> {
        let document: ArtifactDocument = serde_json::from_reader(reader)?;

        if document.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(IntentError::Json(serde::de::Error::custom(format!(
                "unsupported artifact format version {}",
                document.format_version
            ))));
        }

        debug!(
            "Read {} artifact for '{}' written at {}",
            document.backend,
            document.schema.record,
            document.trained_at.to_rfc3339()
        );

        Ok((document.model, document.schema))
    }
}
