//! Integration tests for the learner lifecycle.
//!
//! These tests drive the public API end to end: implicit training, saving,
//! loading and the three prediction shapes, against scratch artifact
//! directories.

use intent_learning::{
    AlgorithmVariant, CrossValidationReport, ErrorKind, FieldDescriptor, FittedModel, IntentError,
    Learner, LifecycleState, LifecycleStep, MlBackend, ModelSchema, NativeBackend,
    PipelineDescription, Prediction, RawPrediction, Record, RecordSchema, Result, TrainingStage,
};
use polars::prelude::DataFrame;
use pretty_assertions::assert_eq;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Phrase {
    negative: bool,
    text: String,
}

impl Record for Phrase {
    fn schema() -> RecordSchema<Self> {
        RecordSchema::new("Phrase")
            .field(
                FieldDescriptor::boolean("Label", |p: &Phrase| p.negative)
                    .writable(|p, raw| p.negative = raw.predicted_label),
            )
            .field(FieldDescriptor::text("Text", |p: &Phrase| p.text.clone()))
    }
}

#[derive(Debug, Clone, Default)]
struct Row {
    val1: f32,
    val2: f32,
    val3: f32,
    label: f32,
}

impl Record for Row {
    fn schema() -> RecordSchema<Self> {
        RecordSchema::new("Row")
            .field(FieldDescriptor::numeric("Val1", |r: &Row| r.val1))
            .field(FieldDescriptor::numeric("Val2", |r: &Row| r.val2))
            .field(FieldDescriptor::numeric("Val3", |r: &Row| r.val3))
            .field(
                FieldDescriptor::numeric("Label", |r: &Row| r.label)
                    .writable(|r, raw| r.label = raw.score),
            )
    }
}

#[derive(Debug, Clone, Default)]
struct Embedded {
    embedding: Vec<f32>,
    label: f32,
}

impl Record for Embedded {
    fn schema() -> RecordSchema<Self> {
        RecordSchema::new("Embedded")
            .field(FieldDescriptor::vector("Features", |e: &Embedded| e.embedding.clone()))
            .field(FieldDescriptor::numeric("Label", |e: &Embedded| e.label))
    }
}

/// Same rows as [`Embedded`], with the vector field called `Embedding`.
#[derive(Debug, Clone)]
struct Renamed(Embedded);

impl Record for Renamed {
    fn schema() -> RecordSchema<Self> {
        RecordSchema::new("Renamed")
            .field(FieldDescriptor::vector("Embedding", |r: &Renamed| r.0.embedding.clone()))
            .field(FieldDescriptor::numeric("Label", |r: &Renamed| r.0.label))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const PHRASES: &str = "\
0   Great Pizza
0   Awesome customer service
1   Dirty floors
1   Very expensive
0   Toppings are good
1   Parking is terrible
0   Bathrooms are clean
1   Management is unhelpful
0   Lighting and atmosphere are romantic
1   Crust was burnt
0   Pineapple was freshv
1   Lack of garlic cloves is upsetting
0   Good experience, would come back
0   Friendly staff
1   Rude customer service
1   Waiters never came back
1   Could not believe the napkins were $10!
0   Supersized Pizza is a great deal
0   $5 all you can eat deal is good
1   Overpriced and was shocked that utensils were an upcharge";

fn phrases() -> Vec<Phrase> {
    PHRASES
        .lines()
        .map(|line| Phrase {
            negative: line.starts_with('1'),
            text: line[4..].to_string(),
        })
        .collect()
}

fn query(text: &str) -> Phrase {
    Phrase {
        negative: false,
        text: text.to_string(),
    }
}

fn rows() -> Vec<Row> {
    [
        (1.0, 0.0, 0.0, 1.0),
        (0.0, 1.0, 0.0, 0.0),
        (0.0, 0.0, 1.0, 0.0),
        (1.0, 1.0, 0.0, 1.0),
        (1.0, 0.0, 1.0, 1.0),
        (0.0, 1.0, 1.0, 0.0),
        (1.0, 1.0, 1.0, 1.0),
        (0.0, 0.0, 0.0, 0.0),
    ]
    .into_iter()
    .map(|(val1, val2, val3, label)| Row {
        val1,
        val2,
        val3,
        label,
    })
    .collect()
}

fn embedded() -> Vec<Embedded> {
    (0..30)
        .map(|i| Embedded {
            embedding: vec![i as f32, (i % 3) as f32],
            label: if i < 15 { 0.0 } else { 1.0 },
        })
        .collect()
}

fn text_learner(dir: &Path) -> Learner<Phrase, bool> {
    Learner::builder()
        .learn_from(phrases())
        .artifact_dir(dir)
        .save_as("phrases.model")
        .build()
        .expect("valid configuration")
}

/// Delegates to [`NativeBackend`] but refuses to fit.
struct RefusingBackend {
    inner: NativeBackend,
    fits: AtomicUsize,
}

impl RefusingBackend {
    fn new() -> Self {
        Self {
            inner: NativeBackend::default(),
            fits: AtomicUsize::new(0),
        }
    }
}

impl MlBackend for RefusingBackend {
    fn name(&self) -> &'static str {
        "refusing"
    }

    fn split(&self, table: &DataFrame, holdout_fraction: f64) -> Result<(DataFrame, DataFrame)> {
        self.inner.split(table, holdout_fraction)
    }

    fn fit(&self, _table: &DataFrame, _pipeline: &PipelineDescription) -> Result<FittedModel> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        Err(IntentError::TrainingFailed("solver diverged".to_string()))
    }

    fn transform(
        &self,
        model: &FittedModel,
        table: &DataFrame,
        score_column: &str,
    ) -> Result<DataFrame> {
        self.inner.transform(model, table, score_column)
    }

    fn predict_one(&self, model: &FittedModel, row: &DataFrame) -> Result<RawPrediction> {
        self.inner.predict_one(model, row)
    }

    fn cross_validate(
        &self,
        table: &DataFrame,
        pipeline: &PipelineDescription,
        folds: usize,
    ) -> Result<CrossValidationReport> {
        self.inner.cross_validate(table, pipeline, folds)
    }

    fn serialize_model(
        &self,
        model: &FittedModel,
        schema: &ModelSchema,
        writer: &mut dyn Write,
    ) -> Result<()> {
        self.inner.serialize_model(model, schema, writer)
    }

    fn deserialize_model(&self, reader: &mut dyn Read) -> Result<(FittedModel, ModelSchema)> {
        self.inner.deserialize_model(reader)
    }
}

// ============================================================================
// Text Variant
// ============================================================================

#[test]
fn test_text_scenario_flags_negative_phrase() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = text_learner(dir.path());

    let prediction: Prediction<bool> = learner
        .predict_with_output(&query("Parking is terrible"))
        .unwrap();

    assert!(prediction.predicted_label);
    assert!(prediction.probability > 0.5);
    assert!(prediction.score.is_finite());
    assert_eq!(learner.state(), LifecycleState::Trained);
    assert!(dir.path().join("phrases.model").exists());
}

#[test]
fn test_output_shapes_agree() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = text_learner(dir.path());
    let phrase = query("Rude customer service");

    let structured = learner.predict_with_output(&phrase).unwrap();
    let label = learner.predict(&phrase).unwrap();
    let score = learner.predict_score(&phrase).unwrap();

    assert_eq!(structured.predicted_label, label);
    assert_eq!(structured.score, score.score);
}

#[test]
fn test_training_reports_held_out_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = text_learner(dir.path());
    learner.train().unwrap();

    let outcome = learner.last_training().unwrap();
    assert_eq!(outcome.training_rows, 16);
    assert_eq!(outcome.held_out.map(|h| h.rows), Some(4));
    // Binary pipelines skip the diagnostic cross-validation.
    assert!(outcome.cross_validation.is_none());
}

#[test]
fn test_implicit_training_happens_once() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Arc::new(AtomicUsize::new(0));
    let counter = fits.clone();

    let mut learner = Learner::<Phrase, bool>::builder()
        .learn_from(phrases())
        .artifact_dir(dir.path())
        .on_progress(move |u| {
            if u.stage == TrainingStage::Fitting {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    for text in ["Great Pizza", "Dirty floors", "Friendly staff"] {
        learner.predict(&query(text)).unwrap();
    }
    assert_eq!(fits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_predict_and_set_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = text_learner(dir.path());

    let once = learner.predict_and_set(query("Crust was burnt")).unwrap();
    let twice = learner.predict_and_set(once.clone()).unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.text, "Crust was burnt");
}

// ============================================================================
// Tabular Variant
// ============================================================================

#[test]
fn test_tabular_scenario_scores_finite() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Row, f32>::builder()
        .learn_from(rows())
        .using(AlgorithmVariant::GradientBoostRegression)
        .artifact_dir(dir.path())
        .build()
        .unwrap();

    let sample = Row {
        val1: 1.0,
        ..Row::default()
    };
    let prediction = learner.predict_with_output(&sample).unwrap();
    assert!(prediction.score.is_finite());
    assert_eq!(prediction.predicted_label, prediction.score);

    let outcome = learner.last_training().unwrap();
    assert_eq!(
        outcome.pipeline.concatenated_fields(),
        Some(&["Val1".to_string(), "Val2".to_string(), "Val3".to_string()][..])
    );
    assert_eq!(outcome.schema.input_columns, vec!["Val1", "Val2", "Val3"]);
}

#[test]
fn test_tabular_predict_and_set_writes_score() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Row, f32>::builder()
        .learn_from(rows())
        .using_tag("lightgbm")
        .unwrap()
        .artifact_dir(dir.path())
        .build()
        .unwrap();

    let sample = Row {
        val1: 1.0,
        label: f32::NAN,
        ..Row::default()
    };
    let score = learner.predict_score(&sample).unwrap().score;
    let updated = learner.predict_and_set(sample).unwrap();
    assert_eq!(updated.label, score);
}

// ============================================================================
// Declared Features
// ============================================================================

#[test]
fn test_declared_features_train_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Embedded, f32>::builder()
        .learn_from(embedded())
        .using(AlgorithmVariant::GradientBoostRegression)
        .including_features()
        .artifact_dir(dir.path())
        .save_as("embedded.model")
        .build()
        .unwrap();

    let sample = Embedded {
        embedding: vec![27.0, 0.0],
        label: 0.0,
    };
    let trained = learner.predict_with_output(&sample).unwrap();
    assert!(trained.score.is_finite());
    assert!(trained.predicted_label > 0.5);

    let outcome = learner.last_training().unwrap();
    assert!(outcome.pipeline.concatenated_fields().is_none());
    assert_eq!(outcome.schema.input_columns, vec!["Features"]);

    let mut restored = Learner::<Embedded, f32>::builder()
        .artifact_dir(dir.path())
        .from_artifact("embedded.model")
        .build()
        .unwrap();
    let reloaded = restored.predict_with_output(&sample).unwrap();
    assert_eq!(restored.state(), LifecycleState::Loaded);
    assert_eq!(reloaded, trained);
}

#[test]
fn test_renamed_features_column() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<Renamed> = embedded().into_iter().map(Renamed).collect();
    let mut learner = Learner::<Renamed, f32>::builder()
        .learn_from(records)
        .using(AlgorithmVariant::GradientBoostRegression)
        .where_features_are("Embedding")
        .including_features()
        .artifact_dir(dir.path())
        .build()
        .unwrap();

    let low = learner
        .predict_score(&Renamed(Embedded {
            embedding: vec![2.0, 2.0],
            label: 0.0,
        }))
        .unwrap();
    let high = learner
        .predict_score(&Renamed(Embedded {
            embedding: vec![28.0, 1.0],
            label: 0.0,
        }))
        .unwrap();
    assert!(high.score > low.score);

    let outcome = learner.last_training().unwrap();
    assert_eq!(outcome.schema.input_columns, vec!["Embedding"]);
    assert_eq!(outcome.schema.feature_column, "Embedding");
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_then_load_reproduces_scores() {
    let dir = tempfile::tempdir().unwrap();
    let mut trained = text_learner(dir.path());
    trained.save("reviews.model").unwrap();
    let expected = trained.predict_score(&query("Very expensive")).unwrap();

    let mut restored = Learner::<Phrase, bool>::builder()
        .artifact_dir(dir.path())
        .build()
        .unwrap();
    restored.load(Some("reviews.model")).unwrap();
    assert_eq!(restored.state(), LifecycleState::Loaded);

    let actual = restored.predict_score(&query("Very expensive")).unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn test_load_without_name_uses_configured_artifact() {
    let dir = tempfile::tempdir().unwrap();
    text_learner(dir.path()).train().unwrap();

    let mut restored = Learner::<Phrase, bool>::builder()
        .artifact_dir(dir.path())
        .save_as("phrases.model")
        .build()
        .unwrap();
    restored.load(None).unwrap();
    assert_eq!(restored.state(), LifecycleState::Loaded);
}

#[test]
fn test_load_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = text_learner(dir.path());

    let err = learner.load(Some("nonexistent_artifact")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    assert_eq!(learner.state(), LifecycleState::Untrained);
}

#[test]
fn test_load_rejects_artifact_for_other_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabular = Learner::<Row, f32>::builder()
        .learn_from(rows())
        .using(AlgorithmVariant::GradientBoostRegression)
        .artifact_dir(dir.path())
        .save_as("rows.model")
        .build()
        .unwrap();
    tabular.train().unwrap();

    let mut phrases = Learner::<Phrase, bool>::builder()
        .artifact_dir(dir.path())
        .build()
        .unwrap();
    let err = phrases.load(Some("rows.model")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactCorrupt);
    assert_eq!(phrases.state(), LifecycleState::Untrained);
}

#[test]
fn test_from_artifact_loads_on_first_prediction() {
    let dir = tempfile::tempdir().unwrap();
    text_learner(dir.path()).train().unwrap();

    let mut restored = Learner::<Phrase, bool>::builder()
        .artifact_dir(dir.path())
        .from_artifact("phrases.model")
        .build()
        .unwrap();
    assert_eq!(restored.state(), LifecycleState::Trained);

    assert!(restored.predict(&query("Parking is terrible")).unwrap());
    assert_eq!(restored.state(), LifecycleState::Loaded);
}

// ============================================================================
// Failure Paths
// ============================================================================

#[test]
fn test_no_training_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Phrase, bool>::builder()
        .artifact_dir(dir.path())
        .build()
        .unwrap();

    let err = learner.train().unwrap_err();
    assert!(matches!(err, IntentError::NoTrainingData));

    let err = learner.predict(&query("Great Pizza")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTrainingData);
    assert_eq!(err.step(), Some(LifecycleStep::Train));
}

#[test]
fn test_single_record_trains() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Phrase, bool>::builder()
        .learn_from(vec![Phrase {
            negative: true,
            text: "Dirty floors".to_string(),
        }])
        .artifact_dir(dir.path())
        .build()
        .unwrap();

    learner.train().unwrap();
    assert_eq!(learner.last_training().map(|o| o.training_rows), Some(1));
    assert!(learner.predict_score(&query("Dirty floors")).unwrap().score.is_finite());
}

#[test]
fn test_missing_label_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = Learner::<Phrase, bool>::builder()
        .learn_from(phrases())
        .artifact_dir(dir.path())
        .where_result_is("Sentiment")
        .build()
        .unwrap();

    let err = learner.predict_and_set(query("Great Pizza")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LabelFieldNotFound);
    assert!(err.is_configuration_error());
}

#[test]
fn test_failed_fit_leaves_learner_untrained() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RefusingBackend::new());

    let mut learner = Learner::<Phrase, bool>::builder()
        .learn_from(phrases())
        .artifact_dir(dir.path())
        .backend(backend.clone())
        .build()
        .unwrap();

    let err = learner.predict(&query("Great Pizza")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrainingFailed);
    assert_eq!(err.step(), Some(LifecycleStep::Train));
    assert_eq!(learner.state(), LifecycleState::Untrained);
    assert!(!dir.path().join("_model").exists());

    // Still untrained, so the next call tries again.
    let _ = learner.predict(&query("Great Pizza"));
    assert_eq!(backend.fits.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_shared_learner_serves_threads() {
    let dir = tempfile::tempdir().unwrap();
    let shared = text_learner(dir.path()).into_shared();

    let handles: Vec<_> = ["Great Pizza", "Dirty floors", "Friendly staff", "Crust was burnt"]
        .into_iter()
        .map(|text| {
            let shared = shared.clone();
            std::thread::spawn(move || shared.predict_with_output(&query(text)).unwrap())
        })
        .collect();

    for handle in handles {
        let prediction = handle.join().unwrap();
        assert!(prediction.probability.is_finite());
    }
    assert_eq!(shared.state(), LifecycleState::Trained);
    assert!(shared.with(|learner| learner.last_training().is_some()));
}
