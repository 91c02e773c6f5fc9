//! The ML collaborator seam.
//!
//! Everything numeric (featurizing, fitting, scoring, serializing) happens
//! behind [`MlBackend`]. The lifecycle code in this crate only ever holds a
//! [`FittedModel`] as an opaque handle and passes tables around as polars
//! [`DataFrame`]s built by [`load_table`].
//!
//! [`NativeBackend`] is the default implementation. Tests plug in their own
//! backends to observe or break individual operations.

pub mod native;
pub mod table;

use std::io::{Read, Write};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::{PipelineDescription, Stage, TrainerKind};
use crate::types::{CrossValidationReport, RawPrediction};

pub use native::NativeBackend;
pub use table::load_table;

/// Opaque trained pipeline produced by [`MlBackend::fit`].
///
/// Only the backend that produced it can interpret it; callers hold it, hand it
/// back for inference, and persist it through the backend's codec.
///
/// Its contents are the [`NativeBackend`] representation and cannot be built
/// outside this crate. Other backends obtain one from `NativeBackend::fit` or
/// `NativeBackend::deserialize_model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub(crate) features: native::FeatureMap,
    pub(crate) predictor: native::Predictor,
}

impl FittedModel {
    /// The trainer that produced the terminal predictor.
    pub fn trainer(&self) -> TrainerKind {
        self.predictor.trainer()
    }

    /// Width of the feature vector the predictor consumes.
    pub fn feature_count(&self) -> usize {
        self.predictor.feature_count()
    }
}

/// The input contract persisted next to a fitted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Record type the model was trained on.
    pub record: String,
    /// Columns the fitted pipeline reads at inference time, in order.
    pub input_columns: Vec<String>,
    pub label_column: String,
    pub feature_column: String,
    pub trainer: TrainerKind,
}

impl ModelSchema {
    /// Derive the input contract of `pipeline` for record type `record`.
    ///
    /// Returns `None` when the pipeline has no `Train` stage.
    pub fn for_pipeline(record: &str, pipeline: &PipelineDescription) -> Option<Self> {
        let (trainer, label_column, feature_column) = match pipeline.train_stage()? {
            Stage::Train {
                trainer,
                label_column,
                feature_column,
                ..
            } => (*trainer, label_column.clone(), feature_column.clone()),
            _ => return None,
        };

        let mut input_columns = Vec::new();
        for stage in pipeline.stages() {
            match stage {
                Stage::Featurize { input, .. } => input_columns.push(input.clone()),
                Stage::Concatenate { inputs, .. } => input_columns.extend(inputs.iter().cloned()),
                Stage::Train { .. } => {}
            }
        }
        if input_columns.is_empty() {
            input_columns.push(feature_column.clone());
        }

        Some(Self {
            record: record.to_string(),
            input_columns,
            label_column,
            feature_column,
            trainer,
        })
    }
}

/// The operations the lifecycle core consumes from an ML toolkit.
///
/// Implementations must be shareable across threads; a learner holds its
/// backend behind an `Arc`.
///
/// Only [`NativeBackend`] can produce a [`FittedModel`]. A custom backend
/// wraps it and delegates `fit` and `deserialize_model`, overriding the
/// operations it wants to observe or replace:
///
/// ```
/// use intent_learning::{
///     CrossValidationReport, FittedModel, MlBackend, ModelSchema, NativeBackend,
///     PipelineDescription, RawPrediction, Result,
/// };
/// use polars::prelude::DataFrame;
/// use std::io::{Read, Write};
///
/// struct Logged(NativeBackend);
///
/// impl MlBackend for Logged {
///     fn name(&self) -> &'static str {
///         "logged"
///     }
///     fn split(&self, table: &DataFrame, fraction: f64) -> Result<(DataFrame, DataFrame)> {
///         self.0.split(table, fraction)
///     }
///     fn fit(&self, table: &DataFrame, pipeline: &PipelineDescription) -> Result<FittedModel> {
///         println!("fitting {} rows", table.height());
///         self.0.fit(table, pipeline)
///     }
///     fn transform(&self, model: &FittedModel, table: &DataFrame, score: &str) -> Result<DataFrame> {
///         self.0.transform(model, table, score)
///     }
///     fn predict_one(&self, model: &FittedModel, row: &DataFrame) -> Result<RawPrediction> {
///         self.0.predict_one(model, row)
///     }
///     fn cross_validate(
///         &self,
///         table: &DataFrame,
///         pipeline: &PipelineDescription,
///         folds: usize,
///     ) -> Result<CrossValidationReport> {
///         self.0.cross_validate(table, pipeline, folds)
///     }
///     fn serialize_model(
///         &self,
///         model: &FittedModel,
///         schema: &ModelSchema,
///         writer: &mut dyn Write,
///     ) -> Result<()> {
///         self.0.serialize_model(model, schema, writer)
///     }
///     fn deserialize_model(&self, reader: &mut dyn Read) -> Result<(FittedModel, ModelSchema)> {
///         self.0.deserialize_model(reader)
///     }
/// }
/// ```
pub trait MlBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Partition `table` into `(training, held_out)`, holding out
    /// `holdout_fraction` of the rows. Every row lands in exactly one side.
    fn split(&self, table: &DataFrame, holdout_fraction: f64) -> Result<(DataFrame, DataFrame)>;

    /// Fit every stage of `pipeline` on `table`.
    fn fit(&self, table: &DataFrame, pipeline: &PipelineDescription) -> Result<FittedModel>;

    /// Score every row of `table`, returning it with `score_column`,
    /// `Probability` and `PredictedLabel` columns appended. Existing columns
    /// of those names are replaced.
    fn transform(
        &self,
        model: &FittedModel,
        table: &DataFrame,
        score_column: &str,
    ) -> Result<DataFrame>;

    /// Score the single row of `row`.
    fn predict_one(&self, model: &FittedModel, row: &DataFrame) -> Result<RawPrediction>;

    /// Refit `pipeline` on `folds` partitions of `table` and score each
    /// held-out fold.
    fn cross_validate(
        &self,
        table: &DataFrame,
        pipeline: &PipelineDescription,
        folds: usize,
    ) -> Result<CrossValidationReport>;

    /// Write `model` and its input `schema` to `writer`.
    fn serialize_model(
        &self,
        model: &FittedModel,
        schema: &ModelSchema,
        writer: &mut dyn Write,
    ) -> Result<()>;

    /// Read a model and its input schema back from `reader`.
    fn deserialize_model(&self, reader: &mut dyn Read) -> Result<(FittedModel, ModelSchema)>;
}

static_assertions::assert_impl_all!(FittedModel: Send, Sync, Clone);
static_assertions::assert_impl_all!(NativeBackend: MlBackend, Send, Sync);
