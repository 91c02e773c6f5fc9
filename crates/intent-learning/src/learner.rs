//! The top-level learner and its lifecycle.
//!
//! A [`Learner`] is assembled once through [`LearnerBuilder`] and then moves
//! through three states:
//!
//! ```text
//!   Untrained ──train──▶ Trained
//!       │                   │
//!       └──────load─────────┴──▶ Loaded
//! ```
//!
//! Every prediction call goes through [`Learner::ensure_ready()`], which
//! trains at most once (if the learner is still untrained) and loads at most
//! once (if no model is bound yet, e.g. for a learner created with
//! [`LearnerBuilder::from_artifact()`]). A learner never returns to
//! `Untrained`.
//!
//! # Concurrency
//!
//! Lifecycle methods take `&mut self`, so a plain `Learner` cannot be driven
//! from two threads at once. To share one across threads use
//! [`SharedLearner`], which serializes every call behind a mutex and so makes
//! the "check untrained, then train" transition atomic.
//!
//! # Example
//!
//! ```no_run
//! use intent_learning::{FieldDescriptor, Learner, Record, RecordSchema};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Review {
//!     label: bool,
//!     text: String,
//! }
//!
//! impl Record for Review {
//!     fn schema() -> RecordSchema<Self> {
//!         RecordSchema::new("Review")
//!             .field(
//!                 FieldDescriptor::boolean("Label", |r: &Review| r.label)
//!                     .writable(|r, p| r.label = p.predicted_label),
//!             )
//!             .field(FieldDescriptor::text("Text", |r: &Review| r.text.clone()))
//!     }
//! }
//!
//! let data = vec![
//!     Review { label: false, text: "Great Pizza".into() },
//!     Review { label: true, text: "Parking is terrible".into() },
//! ];
//!
//! let mut learner = Learner::<Review, bool>::builder()
//!     .learn_from(data)
//!     .build()?;
//!
//! let negative = learner.predict(&Review { label: false, text: "Parking is terrible".into() })?;
//! # Ok::<(), intent_learning::IntentError>(())
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::backend::{FittedModel, MlBackend, ModelSchema, NativeBackend};
use crate::config::{AlgorithmVariant, LearnerConfig, LearnerConfigBuilder};
use crate::error::{IntentError, LifecycleStep, Result};
use crate::inference::{InferenceEngine, label_setter};
use crate::persistence::ModelStore;
use crate::progress::{ProgressCallback, ProgressUpdate};
use crate::schema::Record;
use crate::trainer::{TrainingOrchestrator, TrainingOutcome};
use crate::types::{Label, Prediction, ScoreOutput};

/// Where a learner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Untrained,
    Trained,
    /// A model was read from an artifact. Counts as trained.
    Loaded,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Untrained => "untrained",
            LifecycleState::Trained => "trained",
            LifecycleState::Loaded => "loaded",
        }
    }

    /// `true` for `Trained` and `Loaded`.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !matches!(self, LifecycleState::Untrained)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for [`Learner`].
///
/// Setters consume and return the builder; nothing is validated until
/// [`build()`](Self::build).
pub struct LearnerBuilder<R, L = bool> {
    config: LearnerConfigBuilder,
    data: Option<Vec<R>>,
    backend: Option<Arc<dyn MlBackend>>,
    progress: Option<ProgressCallback>,
    pretrained: bool,
    _label: PhantomData<fn() -> L>,
}

impl<R, L> fmt::Debug for LearnerBuilder<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnerBuilder")
            .field("config", &self.config)
            .field("records", &self.data.as_ref().map(Vec::len))
            .field("pretrained", &self.pretrained)
            .finish_non_exhaustive()
    }
}

impl<R: Record, L: Label> Default for LearnerBuilder<R, L> {
    fn default() -> Self {
        Self {
            config: LearnerConfig::builder(),
            data: None,
            backend: None,
            progress: None,
            pretrained: false,
            _label: PhantomData,
        }
    }
}

impl<R: Record, L: Label> LearnerBuilder<R, L> {
    /// Name the label column.
    #[must_use]
    pub fn where_result_is(mut self, column: impl Into<String>) -> Self {
        self.config = self.config.label_column(column);
        self
    }

    /// Name the text column the text pipeline featurizes.
    #[must_use]
    pub fn where_input_is(mut self, column: impl Into<String>) -> Self {
        self.config = self.config.input_column(column);
        self
    }

    #[must_use]
    pub fn where_score_is(mut self, column: impl Into<String>) -> Self {
        self.config = self.config.score_column(column);
        self
    }

    /// Name a precomputed feature vector column. Implies
    /// [`including_features()`](Self::including_features).
    ///
    /// Only the gradient boosting variant reads it; the text variant always
    /// featurizes into [`TEXT_FEATURES_COLUMN`](crate::TEXT_FEATURES_COLUMN).
    #[must_use]
    pub fn where_features_are(mut self, column: impl Into<String>) -> Self {
        self.config = self.config.features_column(column);
        self
    }

    /// Declare that records already carry the `Features` vector, so the field
    /// list is never derived from the record schema.
    #[must_use]
    pub fn including_features(mut self) -> Self {
        self.config = self.config.including_features();
        self
    }

    /// Attach the training records. The learner owns them from here on.
    #[must_use]
    pub fn learn_from(mut self, data: impl IntoIterator<Item = R>) -> Self {
        self.data = Some(data.into_iter().collect());
        self
    }

    #[must_use]
    pub fn using(mut self, variant: AlgorithmVariant) -> Self {
        self.config = self.config.variant(variant);
        self
    }

    /// Select the variant by tag, e.g. `"text"` or `"lightgbm"`.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::UnsupportedVariant`] for an unknown tag.
    pub fn using_tag(self, tag: &str) -> Result<Self> {
        let variant = tag.parse::<AlgorithmVariant>()?;
        Ok(self.using(variant))
    }

    /// Artifact name training saves under and loading reads from.
    #[must_use]
    pub fn save_as(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.artifact_name(name);
        self
    }

    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.artifact_dir(dir);
        self
    }

    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config = self.config.random_seed(seed);
        self
    }

    /// Start from a model trained earlier under `name`.
    ///
    /// The learner begins `Trained` with no model bound, so the first
    /// prediction loads the artifact instead of training.
    #[must_use]
    pub fn from_artifact(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.artifact_name(name);
        self.pretrained = true;
        self
    }

    /// Replace the default [`NativeBackend`].
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn MlBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Receive [`ProgressUpdate`]s while training.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Validate the configuration and create the learner.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::InvalidConfig`] if a column or artifact name is
    /// empty.
    pub fn build(self) -> Result<Learner<R, L>> {
        let config = self.config.build()?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(NativeBackend::with_seed(config.random_seed)));
        let store = ModelStore::new(config.artifact_dir.clone(), backend.clone());
        let state = if self.pretrained {
            LifecycleState::Trained
        } else {
            LifecycleState::Untrained
        };

        debug!(
            "Built {} learner for {} ({} record(s), state {})",
            config.variant,
            R::schema().record_name(),
            self.data.as_ref().map_or(0, Vec::len),
            state
        );

        Ok(Learner {
            config,
            data: self.data,
            state,
            trained: None,
            loaded: None,
            backend,
            store,
            progress: self.progress,
            _label: PhantomData,
        })
    }
}

/// A lazily trained model over records of type `R`, predicting labels of
/// type `L`.
pub struct Learner<R, L = bool> {
    config: LearnerConfig,
    data: Option<Vec<R>>,
    state: LifecycleState,
    trained: Option<TrainingOutcome>,
    loaded: Option<(FittedModel, ModelSchema)>,
    backend: Arc<dyn MlBackend>,
    store: ModelStore,
    progress: Option<ProgressCallback>,
    _label: PhantomData<fn() -> L>,
}

impl<R, L> fmt::Debug for Learner<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Learner")
            .field("config", &self.config)
            .field("records", &self.data.as_ref().map(Vec::len))
            .field("state", &self.state)
            .field("model_bound", &(self.trained.is_some() || self.loaded.is_some()))
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl<R: Record, L: Label> Learner<R, L> {
    #[must_use]
    pub fn builder() -> LearnerBuilder<R, L> {
        LearnerBuilder::default()
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Diagnostics of the last training run in this instance.
    pub fn last_training(&self) -> Option<&TrainingOutcome> {
        self.trained.as_ref()
    }

    /// Where the configured artifact lives.
    pub fn artifact_path(&self) -> PathBuf {
        self.store.artifact_path(&self.config.artifact_name)
    }

    fn bound_model(&self) -> Option<&FittedModel> {
        self.loaded
            .as_ref()
            .map(|(model, _)| model)
            .or_else(|| self.trained.as_ref().map(|outcome| &outcome.model))
    }

    /// Train on the attached records and persist the result.
    ///
    /// On failure the state is left as it was.
    ///
    /// # Errors
    ///
    /// - [`IntentError::NoTrainingData`] if no records were attached.
    /// - Anything [`TrainingOrchestrator::train`] returns.
    pub fn train(&mut self) -> Result<()> {
        let data = self.data.as_deref().ok_or(IntentError::NoTrainingData)?;

        let orchestrator = TrainingOrchestrator::new(self.backend.clone(), self.store.clone())
            .with_progress(self.progress.clone());
        let outcome = orchestrator.train(&self.config, data)?;

        info!(
            "Trained {} model for {}; artifact at {}",
            self.config.variant,
            R::schema().record_name(),
            outcome.artifact_path.display()
        );

        self.trained = Some(outcome);
        self.loaded = None;
        self.state = LifecycleState::Trained;
        Ok(())
    }

    /// Record `name` as the artifact name, training first if still untrained.
    ///
    /// A trained learner is not re-saved; the new name only affects later
    /// loads.
    pub fn save(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(IntentError::InvalidConfig(
                "artifact_name must not be empty".to_string(),
            ));
        }
        self.config.artifact_name = name.to_string();

        if self.state == LifecycleState::Untrained {
            self.train()?;
        } else {
            debug!("Already trained; recorded artifact name '{}'", name);
        }
        Ok(())
    }

    /// Bind the model stored as `name` (or the configured artifact name).
    ///
    /// # Errors
    ///
    /// - [`IntentError::ArtifactNotFound`] if there is no such artifact.
    /// - [`IntentError::ArtifactCorrupt`] if it cannot be decoded or expects
    ///   columns `R` does not have.
    ///
    /// The state is unchanged on failure.
    pub fn load(&mut self, name: Option<&str>) -> Result<()> {
        let name = name.unwrap_or(self.config.artifact_name.as_str()).to_string();
        let (model, schema) = self.store.load(&name)?;

        let record = R::schema();
        if let Some(missing) = schema
            .input_columns
            .iter()
            .find(|column| record.find(column).is_none())
        {
            return Err(IntentError::ArtifactCorrupt {
                path: self.store.artifact_path(&name).display().to_string(),
                reason: format!(
                    "model reads column '{}' which {} does not have",
                    missing,
                    record.record_name()
                ),
            });
        }

        info!(
            "Loaded {} model '{}' for {}",
            schema.trainer.as_str(),
            name,
            record.record_name()
        );

        self.loaded = Some((model, schema));
        self.state = LifecycleState::Loaded;
        Ok(())
    }

    /// Train if untrained, then load if no model is bound.
    ///
    /// Errors are tagged with the step that produced them.
    pub fn ensure_ready(&mut self) -> Result<()> {
        if self.state == LifecycleState::Untrained {
            info!("{} learner is untrained; training now", R::schema().record_name());
            self.train().map_err(|e| e.during(LifecycleStep::Train))?;
        }

        if self.bound_model().is_none() {
            self.load(None).map_err(|e| e.during(LifecycleStep::Load))?;
        }
        Ok(())
    }

    fn engine(&self) -> Result<InferenceEngine<'_>> {
        let model = self.bound_model().ok_or_else(|| {
            IntentError::InferenceFailed("no model is bound".to_string()).during(LifecycleStep::Infer)
        })?;
        Ok(InferenceEngine::new(self.backend.as_ref(), model))
    }

    /// Structured prediction `{score, predicted_label, probability}`.
    pub fn predict_with_output(&mut self, record: &R) -> Result<Prediction<L>> {
        self.ensure_ready()?;
        self.engine()?
            .predict_structured(record)
            .map_err(|e| e.during(LifecycleStep::Infer))
    }

    /// Score-only prediction.
    pub fn predict_score(&mut self, record: &R) -> Result<ScoreOutput> {
        self.ensure_ready()?;
        self.engine()?
            .predict_score(record)
            .map_err(|e| e.during(LifecycleStep::Infer))
    }

    /// The predicted label alone.
    pub fn predict(&mut self, record: &R) -> Result<L> {
        self.ensure_ready()?;
        self.engine()?
            .predict_label(record)
            .map_err(|e| e.during(LifecycleStep::Infer))
    }

    /// `record` with its label field overwritten by the prediction.
    ///
    /// The label field is checked before any implicit training.
    pub fn predict_and_set(&mut self, record: R) -> Result<R> {
        label_setter::<R>(&self.config.label_column).map_err(|e| e.during(LifecycleStep::Infer))?;
        self.ensure_ready()?;
        let label_column = self.config.label_column.clone();
        self.engine()?
            .predict_and_mutate(record, &label_column)
            .map_err(|e| e.during(LifecycleStep::Infer))
    }

    /// Move the learner behind a mutex for use from several threads.
    pub fn into_shared(self) -> SharedLearner<R, L> {
        SharedLearner::new(self)
    }
}

/// A [`Learner`] behind `Arc<Mutex<_>>`.
///
/// Every call holds the lock for its whole duration, including any implicit
/// training or loading, so concurrent first predictions train exactly once.
pub struct SharedLearner<R, L = bool> {
    inner: Arc<Mutex<Learner<R, L>>>,
}

impl<R, L> Clone for SharedLearner<R, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, L> fmt::Debug for SharedLearner<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLearner").finish_non_exhaustive()
    }
}

impl<R: Record, L: Label> SharedLearner<R, L> {
    pub fn new(learner: Learner<R, L>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(learner)),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state()
    }

    pub fn train(&self) -> Result<()> {
        self.inner.lock().train()
    }

    pub fn save(&self, name: &str) -> Result<()> {
        self.inner.lock().save(name)
    }

    pub fn load(&self, name: Option<&str>) -> Result<()> {
        self.inner.lock().load(name)
    }

    pub fn predict_with_output(&self, record: &R) -> Result<Prediction<L>> {
        self.inner.lock().predict_with_output(record)
    }

    pub fn predict_score(&self, record: &R) -> Result<ScoreOutput> {
        self.inner.lock().predict_score(record)
    }

    pub fn predict(&self, record: &R) -> Result<L> {
        self.inner.lock().predict(record)
    }

    pub fn predict_and_set(&self, record: R) -> Result<R> {
        self.inner.lock().predict_and_set(record)
    }

    /// Run `f` with exclusive access to the learner.
    pub fn with<T>(&self, f: impl FnOnce(&mut Learner<R, L>) -> T) -> T {
        let mut learner = self.inner.lock();
        f(&mut learner)
    }
}
