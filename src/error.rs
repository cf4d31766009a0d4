use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, AdapterError>;

/// Why a single candidate location could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub path: PathBuf,
    /// `None` when the file simply did not exist.
    pub reason: Option<String>,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.path.display(), reason),
            None => write!(f, "{} (missing)", self.path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("model artifact not found, tried: {}", join_attempts(.attempted))]
    ArtifactNotFound { attempted: Vec<Attempt> },
    #[error("could not deserialize {}: {reason}", .path.display())]
    Deserialization { path: PathBuf, reason: String },
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl AdapterError {
    pub fn deserialization(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Deserialization {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn prediction(reason: impl fmt::Display) -> Self {
        Self::Prediction(reason.to_string())
    }
}

fn join_attempts(attempted: &[Attempt]) -> String {
    if attempted.is_empty() {
        return "<no candidates>".to_string();
    }
    attempted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
