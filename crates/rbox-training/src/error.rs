use std::path::PathBuf;

use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("dataset file {}: {reason}", path.display())]
    Dataset { path: PathBuf, reason: String },

    #[error("cannot restore training state: {0}")]
    StateRestore(String),

    /// Durable storage could not be written. Fatal: the run must not continue
    /// believing a checkpoint exists.
    #[error("storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("training step failed: {0}")]
    Step(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage { path: path.into(), source }
    }

    pub(crate) fn dataset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Dataset { path: path.into(), reason: reason.into() }
    }

    /// Whether this error belongs to the configuration class (bad config or
    /// dataset files), which always fails before the loop starts.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::InvalidConfig(_) | Self::Dataset { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_names_path() {
        let err = TrainingError::storage(
            "/tmp/run/model/bestmodel",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/run/model/bestmodel"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_config_class() {
        assert!(TrainingError::InvalidConfig("lr".to_string()).is_config_error());
        assert!(TrainingError::dataset("x.json", "missing").is_config_error());
        assert!(!TrainingError::StateRestore("shape".to_string()).is_config_error());
    }
}
