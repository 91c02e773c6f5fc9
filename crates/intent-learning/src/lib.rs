//! intent-learning: fluent, lazily-trained learners over typed records.
//!
//! A [`Learner`] couples a record type, a label type and a configuration with
//! an ML backend. It is trained on first use, persists its model as a named
//! artifact, and answers single-record predictions in three shapes.
//!
//! # Quick Start
//!
//! ```no_run
//! use intent_learning::{FieldDescriptor, Learner, Record, RecordSchema};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Phrase {
//!     negative: bool,
//!     text: String,
//! }
//!
//! impl Record for Phrase {
//!     fn schema() -> RecordSchema<Self> {
//!         RecordSchema::new("Phrase")
//!             .field(
//!                 FieldDescriptor::boolean("Label", |p: &Phrase| p.negative)
//!                     .writable(|p, raw| p.negative = raw.predicted_label),
//!             )
//!             .field(FieldDescriptor::text("Text", |p: &Phrase| p.text.clone()))
//!     }
//! }
//!
//! # let phrases: Vec<Phrase> = Vec::new();
//! let mut learner = Learner::<Phrase>::builder()
//!     .learn_from(phrases)
//!     .save_as("phrases.model")
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?;
//!
//! let query = Phrase { negative: false, text: "Parking is terrible".into() };
//! let prediction = learner.predict_with_output(&query)?;
//! println!("negative={} p={:.2}", prediction.predicted_label, prediction.probability);
//! # Ok::<(), intent_learning::IntentError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Learner                               │
//! │   Untrained ──train──► Trained ──(no model bound)──► Loaded      │
//! └──────┬──────────────────────┬───────────────────────┬────────────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//!  TrainingOrchestrator     ModelStore           InferenceEngine
//!  split → select → fit     save / load          structured / score /
//!  → save → diagnostics     (one file handle     label / mutate
//!        │                   per call)                  │
//!        └──────────────┬───────────┴───────────────────┘
//!                       ▼
//!              dyn MlBackend (NativeBackend)
//!      text featurizer · logistic regression · boosted trees
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`](Result), i.e.
//! `Result<T, IntentError>`. Errors escaping a prediction are tagged with the
//! [`LifecycleStep`] that failed; [`IntentError::kind()`] looks through that
//! tag.
//!
//! # Thread Safety
//!
//! [`Learner`] is `Send + Sync` but its lifecycle methods take `&mut self`.
//! Wrap it in a [`SharedLearner`] to drive it from several threads; the mutex
//! guarantees that concurrent first predictions train exactly once.
//!
//! # Modules
//!
//! - [`backend`] - The ML backend seam and the native implementation
//! - [`schema`] - Describing record types to the learner

pub mod backend;
mod config;
mod error;
mod inference;
mod learner;
mod persistence;
mod pipeline;
mod progress;
pub mod schema;
mod split;
mod trainer;
mod types;

// Re-export public API
//
// Configuration types
pub use config::{AlgorithmVariant, LearnerConfig, LearnerConfigBuilder};
// Error types
pub use error::{ErrorKind, IntentError, LifecycleStep, Result};
// Learner types
pub use learner::{Learner, LearnerBuilder, LifecycleState, SharedLearner};
// Component types
pub use backend::{FittedModel, MlBackend, ModelSchema, NativeBackend, load_table};
pub use inference::{InferenceEngine, label_setter};
pub use persistence::ModelStore;
pub use pipeline::{
    GradientBoostOptions, Hyperparameters, PipelineDescription, Stage, TEXT_FEATURES_COLUMN,
    TrainerKind, select_pipeline,
};
pub use schema::{FieldDescriptor, FieldKind, LabelSetter, Record, RecordSchema, reflect_field_names};
pub use split::{DatasetSplit, HOLDOUT_FRACTION, holdout_indices, split_dataset};
pub use trainer::{CV_FOLDS, HeldOutScore, TrainingOrchestrator, TrainingOutcome};
// Progress reporting types
pub use progress::{ParseTrainingStageError, ProgressCallback, ProgressUpdate, TrainingStage};
// Prediction and diagnostics types
pub use types::{
    CrossValidationReport, FoldMetric, Label, Prediction, RawPrediction, ScoreOutput,
};
