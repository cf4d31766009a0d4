//! Model loading and inference adapter

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactFormat, LoaderOptions};
use crate::booster::{Booster, BoosterArtifact, DMatrix, Objective};
use crate::error::{AdapterError, Attempt, Result};
use crate::features::{FeatureInput, FEATURE_COUNT, FEATURE_ORDER};
use crate::onnx::OnnxRegressor;

/// Call convention of the loaded model, fixed at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// Rows go straight to the model's run entry point.
    Standard,
    /// Rows are wrapped in a `DMatrix` first.
    Booster,
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::Standard => write!(f, "standard"),
            Convention::Booster => write!(f, "booster"),
        }
    }
}

#[derive(Debug)]
enum Model {
    Standard(OnnxRegressor),
    Booster(Booster),
}

impl Model {
    fn convention(&self) -> Convention {
        match self {
            Model::Standard(_) => Convention::Standard,
            Model::Booster(_) => Convention::Booster,
        }
    }
}

/// A loaded, immutable model. Share it freely across threads.
#[derive(Debug)]
pub struct Adapter {
    model: Model,
    source: PathBuf,
    format: ArtifactFormat,
}

impl Adapter {
    /// Tries the candidate locations in order and keeps the first artifact
    /// that loads.
    pub fn initialize(options: &LoaderOptions) -> Result<Self> {
        let candidates = options.candidates();
        let mut attempted = Vec::with_capacity(candidates.len());

        for path in candidates {
            if !path.is_file() {
                debug!(path = %path.display(), "Artifact candidate missing");
                attempted.push(Attempt { path, reason: None });
                continue;
            }

            match Self::load(&path) {
                Ok(adapter) => {
                    info!(
                        path = %path.display(),
                        format = ?adapter.format,
                        convention = %adapter.convention(),
                        "Model loaded"
                    );
                    return Ok(adapter);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Artifact candidate failed to load");
                    attempted.push(Attempt {
                        path,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }

        Err(AdapterError::ArtifactNotFound { attempted })
    }

    /// Loads a single artifact file, no candidate search.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| AdapterError::deserialization(path, e))?;
        let format = ArtifactFormat::detect(path, &bytes);

        let model = match format {
            ArtifactFormat::Onnx => Model::Standard(
                OnnxRegressor::load(path).map_err(|e| AdapterError::deserialization(path, e))?,
            ),
            ArtifactFormat::BoosterJson => {
                let booster = match BoosterArtifact::from_slice(&bytes)
                    .map_err(|e| AdapterError::deserialization(path, e))?
                {
                    BoosterArtifact::Booster(booster) => booster,
                    BoosterArtifact::Wrapper(wrapper) => {
                        debug!(
                            estimator = %wrapper.estimator_type,
                            params = %wrapper.params,
                            "Unwrapping estimator into booster"
                        );
                        wrapper.get_booster()
                    }
                };
                check_booster(path, &booster)?;
                debug!(
                    trees = booster.num_trees(),
                    objective = ?booster.objective(),
                    version = ?booster.version(),
                    "Booster ready"
                );
                Model::Booster(booster)
            }
        };

        Ok(Self {
            model,
            source: path.to_path_buf(),
            format,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    pub fn convention(&self) -> Convention {
        self.model.convention()
    }

    /// Output transform of tree models; `None` for plain graphs.
    pub fn objective(&self) -> Option<Objective> {
        match &self.model {
            Model::Standard(graph) => graph.objective(),
            Model::Booster(booster) => Some(booster.objective()),
        }
    }

    /// Predicts a single row. Accepts anything convertible to a
    /// [`FeatureInput`]: a named mapping or an ordered sequence.
    pub fn predict(&self, features: impl Into<FeatureInput>) -> Result<f64> {
        let rows = features.into().to_matrix()?;

        let value = match &self.model {
            Model::Booster(booster) => {
                let dmat = DMatrix::from_dense(rows);
                booster
                    .predict(&dmat)
                    .map_err(AdapterError::prediction)?
                    .first()
                    .copied()
                    .ok_or_else(|| AdapterError::prediction("booster returned no rows"))?
            }
            Model::Standard(graph) => graph.run(&rows).map_err(AdapterError::prediction)?,
        };

        Ok(f64::from(value))
    }
}

fn check_booster(path: &Path, booster: &Booster) -> Result<()> {
    if booster.num_features() != FEATURE_COUNT {
        return Err(AdapterError::deserialization(
            path,
            format!(
                "model was trained on {} features, expected {}",
                booster.num_features(),
                FEATURE_COUNT
            ),
        ));
    }
    let names = booster.feature_names();
    if !names.is_empty() && !names.iter().map(String::as_str).eq(FEATURE_ORDER) {
        warn!(
            path = %path.display(),
            names = ?names,
            "Model feature names differ from the expected column order"
        );
    }
    Ok(())
}
