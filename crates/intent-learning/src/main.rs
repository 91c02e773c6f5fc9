//! CLI entry point for training and querying phrase classifiers.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use intent_learning::{FieldDescriptor, Learner, Prediction, Record, RecordSchema};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One labeled phrase. `negative` is the `1` marker in the data file.
#[derive(Debug, Clone, Default)]
struct ReviewRow {
    negative: bool,
    text: String,
}

impl Record for ReviewRow {
    fn schema() -> RecordSchema<Self> {
        RecordSchema::new("ReviewRow")
            .field(
                FieldDescriptor::boolean("Label", |r: &ReviewRow| r.negative)
                    .writable(|r, p| r.negative = p.predicted_label),
            )
            .field(FieldDescriptor::text("Text", |r: &ReviewRow| r.text.clone()))
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Intent Learning Team",
    version,
    about = "Train and query lazily-trained phrase classifiers",
    long_about = "Train a text classifier from labeled phrases and query it.\n\n\
                  DATA FORMAT:\n  \
                  One phrase per line, prefixed by 0 (not negative) or 1 (negative):\n  \
                  0   Great Pizza\n  \
                  1   Parking is terrible\n\n\
                  EXAMPLES:\n  \
                  intent train --data reviews.txt --artifact reviews.model\n\n  \
                  intent predict --artifact reviews.model \"Parking is terrible\"\n\n  \
                  intent predict --artifact reviews.model --json \"Great Pizza\" | jq ."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a labeled phrase file and save the model artifact
    Train {
        /// Path to the labeled phrase file
        #[arg(short, long)]
        data: PathBuf,

        /// Artifact name the model is saved under
        #[arg(short, long, default_value = "_model")]
        artifact: String,

        /// Directory artifacts are resolved against
        #[arg(long, default_value = ".")]
        artifact_dir: PathBuf,
    },

    /// Classify phrases with a previously trained artifact
    Predict {
        /// Artifact name to load
        #[arg(short, long, default_value = "_model")]
        artifact: String,

        /// Directory artifacts are resolved against
        #[arg(long, default_value = ".")]
        artifact_dir: PathBuf,

        /// Output JSON to stdout instead of a human-readable table
        ///
        /// Disables all logging; only the JSON document is written.
        #[arg(long)]
        json: bool,

        /// Phrases to classify
        #[arg(required = true)]
        phrases: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries the
/// JSON document.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let json = matches!(args.command, Command::Predict { json: true, .. });
    init_logging(&args.log_level, args.quiet, json);

    match args.command {
        Command::Train {
            data,
            artifact,
            artifact_dir,
        } => run_train(&data, &artifact, artifact_dir),
        Command::Predict {
            artifact,
            artifact_dir,
            json,
            phrases,
        } => run_predict(&artifact, artifact_dir, json, phrases),
    }
}

fn run_train(data: &Path, artifact: &str, artifact_dir: PathBuf) -> Result<()> {
    if !data.exists() {
        return Err(anyhow!("Data file not found: {}", data.display()));
    }

    let contents = fs::read_to_string(data)
        .with_context(|| format!("Failed to read {}", data.display()))?;
    let rows = parse_rows(&contents)?;
    info!("Loaded {} labeled phrase(s) from {}", rows.len(), data.display());

    let mut learner = Learner::<ReviewRow>::builder()
        .learn_from(rows)
        .artifact_dir(artifact_dir)
        .on_progress(|u| debug!("[{}] {:.0}% - {}", u.stage, u.progress * 100.0, u.message))
        .build()?;

    learner.save(artifact)?;

    let path = learner.artifact_path();
    match learner.last_training().and_then(|outcome| outcome.held_out) {
        Some(score) => println!(
            "Saved {} ({:?} on {} held-out phrase(s): {:.3})",
            path.display(),
            score.metric,
            score.rows,
            score.value
        ),
        None => println!("Saved {}", path.display()),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PhraseResult {
    phrase: String,
    #[serde(flatten)]
    prediction: Prediction<bool>,
}

fn run_predict(artifact: &str, artifact_dir: PathBuf, json: bool, phrases: Vec<String>) -> Result<()> {
    let mut learner = Learner::<ReviewRow>::builder()
        .artifact_dir(artifact_dir)
        .from_artifact(artifact)
        .build()?;

    let mut results = Vec::with_capacity(phrases.len());
    for phrase in phrases {
        let query = ReviewRow {
            negative: false,
            text: phrase.clone(),
        };
        let prediction = learner
            .predict_with_output(&query)
            .with_context(|| format!("Failed to classify '{phrase}'"))?;
        results.push(PhraseResult { phrase, prediction });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("{:<10} {:<12} {:<10} Phrase", "Negative", "Probability", "Score");
    println!("{}", "-".repeat(60));
    for result in &results {
        println!(
            "{:<10} {:<12.4} {:<10.4} {}",
            result.prediction.predicted_label,
            result.prediction.probability,
            result.prediction.score,
            result.phrase
        );
    }
    Ok(())
}

/// Parse `<0|1><whitespace><phrase>` lines. Blank lines and `#` comments are
/// skipped.
fn parse_rows(contents: &str) -> Result<Vec<ReviewRow>> {
    let mut rows = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (marker, text) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| anyhow!("line {}: expected '<0|1> <phrase>'", number + 1))?;
        let negative = match marker {
            "0" => false,
            "1" => true,
            other => bail!("line {}: label must be 0 or 1, got '{}'", number + 1, other),
        };

        rows.push(ReviewRow {
            negative,
            text: text.trim().to_string(),
        });
    }

    if rows.is_empty() {
        bail!("no labeled phrases found");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows("0   Great Pizza\n\n# comment\n1\tParking is terrible\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].negative);
        assert_eq!(rows[0].text, "Great Pizza");
        assert!(rows[1].negative);
        assert_eq!(rows[1].text, "Parking is terrible");
    }

    #[test]
    fn test_parse_rows_rejects_bad_marker() {
        let err = parse_rows("2 Great Pizza").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(parse_rows("Great").is_err());
        assert!(parse_rows("\n\n").is_err());
    }

    #[test]
    fn test_cli_parses_predict() {
        let args = Args::try_parse_from([
            "intent",
            "predict",
            "--artifact",
            "reviews.model",
            "--json",
            "Parking is terrible",
        ])
        .unwrap();
        match args.command {
            Command::Predict { artifact, json, phrases, .. } => {
                assert_eq!(artifact, "reviews.model");
                assert!(json);
                assert_eq!(phrases, vec!["Parking is terrible".to_string()]);
            }
            Command::Train { .. } => panic!("expected predict"),
        }
    }
}
