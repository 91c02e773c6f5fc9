//! Model persistence.
//!
//! [`ModelStore`] resolves artifact names against a directory and moves
//! models in and out through the backend's codec. Every file handle lives only
//! for the duration of one `save` or `load` call and is closed on every exit
//! path. Writes go to a sibling `.partial` file first and are renamed into
//! place, so a failed save never leaves a truncated artifact behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{FittedModel, MlBackend, ModelSchema};
use crate::error::{IntentError, Result};

/// Named model artifacts under one directory.
#[derive(Clone)]
pub struct ModelStore {
    dir: PathBuf,
    backend: Arc<dyn MlBackend>,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("dir", &self.dir)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>, backend: Arc<dyn MlBackend>) -> Self {
        Self {
            dir: dir.into(),
            backend,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact called `name` lives.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write `model` and its input `schema` as the artifact `name`.
    ///
    /// Returns the path written.
    pub fn save(&self, model: &FittedModel, schema: &ModelSchema, name: &str) -> Result<PathBuf> {
        let path = self.artifact_path(name);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let partial = self.dir.join(format!("{name}.partial"));
        if let Err(err) = self.write_to(&partial, model, schema) {
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
        fs::rename(&partial, &path)?;

        info!("Saved model artifact to {}", path.display());
        Ok(path)
    }

    fn write_to(&self, path: &Path, model: &FittedModel, schema: &ModelSchema) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.backend.serialize_model(model, schema, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read the artifact `name` back.
    ///
    /// # Errors
    ///
    /// - [`IntentError::ArtifactNotFound`] if nothing exists at the path.
    /// - [`IntentError::ArtifactCorrupt`] if it cannot be read or decoded.
    pub fn load(&self, name: &str) -> Result<(FittedModel, ModelSchema)> {
        let path = self.artifact_path(name);
        let shown = path.display().to_string();

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(IntentError::ArtifactNotFound { path: shown });
            }
            Err(err) => {
                return Err(IntentError::ArtifactCorrupt {
                    path: shown,
                    reason: err.to_string(),
                });
            }
        };

        let mut reader = BufReader::new(file);
        let loaded = self
            .backend
            .deserialize_model(&mut reader)
            .map_err(|err| IntentError::ArtifactCorrupt {
                path: shown.clone(),
                reason: err.to_string(),
            })?;

        debug!("Loaded model artifact from {}", shown);
        Ok(loaded)
    }
}
