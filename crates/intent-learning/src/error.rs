//! Error types for the intent-learning crate.
//!
//! This module defines [`IntentError`], the error type returned by every
//! fallible operation in the crate, and [`ErrorKind`], a flat classification
//! that looks through lifecycle decoration.
//!
//! # Propagation policy
//!
//! - **Configuration errors** ([`SchemaEmpty`](IntentError::SchemaEmpty),
//!   [`UnsupportedVariant`](IntentError::UnsupportedVariant),
//!   [`LabelFieldNotFound`](IntentError::LabelFieldNotFound),
//!   [`InvalidConfig`](IntentError::InvalidConfig)) indicate a caller mistake
//!   and are never retried.
//! - **Artifact errors** ([`ArtifactNotFound`](IntentError::ArtifactNotFound),
//!   [`ArtifactCorrupt`](IntentError::ArtifactCorrupt)) are surfaced to the
//!   caller of `load` or of a prediction; nothing retries them.
//! - **Training failures** ([`TrainingFailed`](IntentError::TrainingFailed))
//!   abort the current train call and leave the learner untrained.
//!
//! Errors escaping a prediction call are wrapped in
//! [`Lifecycle`](IntentError::Lifecycle) so the caller can tell whether the
//! implicit train, the implicit load, or the inference itself failed.
//!
//! # Example
//!
//! ```no_run
//! use intent_learning::{ErrorKind, IntentError};
//!
//! fn report(err: &IntentError) {
//!     if err.kind() == ErrorKind::ArtifactNotFound {
//!         eprintln!("train a model first: {err}");
//!     }
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// The lifecycle step a prediction call was executing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStep {
    /// Implicit training triggered by an untrained learner.
    Train,
    /// Implicit load of the persisted artifact.
    Load,
    /// The single-record inference itself.
    Infer,
}

impl LifecycleStep {
    /// Returns the lowercase name used in error messages and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStep::Train => "train",
            LifecycleStep::Load => "load",
            LifecycleStep::Infer => "infer",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat classification of an [`IntentError`].
///
/// [`IntentError::kind()`] looks through [`IntentError::Lifecycle`] so callers
/// can match on the root cause regardless of which step surfaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    SchemaEmpty,
    UnsupportedVariant,
    InsufficientData,
    ArtifactNotFound,
    ArtifactCorrupt,
    NoTrainingData,
    LabelFieldNotFound,
    TrainingFailed,
    InferenceFailed,
    InvalidConfig,
    Io,
    Polars,
    Json,
}

/// The main error type for intent-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IntentError {
    /// The record type exposes no usable data fields.
    ///
    /// Raised by the schema reflector when a [`Record`](crate::Record) schema
    /// is empty, or when nothing is left to concatenate once the label column
    /// is excluded.
    #[error("Record type '{record}' exposes no data fields")]
    SchemaEmpty {
        /// Name of the offending record type.
        record: String,
    },

    /// The algorithm variant tag is not one this crate can assemble.
    #[error("Unsupported algorithm variant '{0}'")]
    UnsupportedVariant(String),

    /// The dataset is too small for the requested operation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No artifact exists at the resolved path.
    #[error("Model artifact not found: {path}")]
    ArtifactNotFound {
        /// The path that was probed.
        path: String,
    },

    /// The artifact exists but could not be decoded.
    #[error("Model artifact '{path}' is corrupt: {reason}")]
    ArtifactCorrupt {
        /// The path that was read.
        path: String,
        /// What the decoder rejected.
        reason: String,
    },

    /// Training was requested before any data was attached to the learner.
    #[error("No training data attached; call learn_from() before training")]
    NoTrainingData,

    /// The configured label column is not a writable field of the record type.
    #[error("Label field '{0}' is not a writable field of the record type")]
    LabelFieldNotFound(String),

    /// The collaborator's fit step failed.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// The collaborator failed to score a record.
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// A builder was given an invalid setting.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error surfaced from a prediction call, tagged with the step that failed.
    #[error("{step} step failed: {source}")]
    Lifecycle {
        step: LifecycleStep,
        #[source]
        source: Box<IntentError>,
    },

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntentError {
    /// Tag this error with the lifecycle step that produced it.
    ///
    /// Already-tagged errors are returned unchanged so the innermost step wins.
    pub fn during(self, step: LifecycleStep) -> Self {
        match self {
            tagged @ IntentError::Lifecycle { .. } => tagged,
            other => IntentError::Lifecycle {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The lifecycle step attached by [`during()`](Self::during), if any.
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            IntentError::Lifecycle { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Flat classification of the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaEmpty { .. } => ErrorKind::SchemaEmpty,
            Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
            Self::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            Self::ArtifactCorrupt { .. } => ErrorKind::ArtifactCorrupt,
            Self::NoTrainingData => ErrorKind::NoTrainingData,
            Self::LabelFieldNotFound(_) => ErrorKind::LabelFieldNotFound,
            Self::TrainingFailed(_) => ErrorKind::TrainingFailed,
            Self::InferenceFailed(_) => ErrorKind::InferenceFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Lifecycle { source, .. } => source.kind(),
            Self::Io(_) => ErrorKind::Io,
            Self::Polars(_) => ErrorKind::Polars,
            Self::Json(_) => ErrorKind::Json,
        }
    }

    /// Stable error code for callers that log or serialize errors.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::SchemaEmpty => "SCHEMA_EMPTY",
            ErrorKind::UnsupportedVariant => "UNSUPPORTED_VARIANT",
            ErrorKind::InsufficientData => "INSUFFICIENT_DATA",
            ErrorKind::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            ErrorKind::ArtifactCorrupt => "ARTIFACT_CORRUPT",
            ErrorKind::NoTrainingData => "NO_TRAINING_DATA",
            ErrorKind::LabelFieldNotFound => "LABEL_FIELD_NOT_FOUND",
            ErrorKind::TrainingFailed => "TRAINING_FAILED",
            ErrorKind::InferenceFailed => "INFERENCE_FAILED",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::Polars => "POLARS_ERROR",
            ErrorKind::Json => "JSON_ERROR",
        }
    }

    /// Check if this error is a caller mistake that must not be retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SchemaEmpty
                | ErrorKind::UnsupportedVariant
                | ErrorKind::LabelFieldNotFound
                | ErrorKind::InvalidConfig
        )
    }
}

/// Result type alias for intent-learning operations.
pub type Result<T> = std::result::Result<T, IntentError>;
