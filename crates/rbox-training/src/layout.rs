use crate::error::{TrainingError, TrainingResult};
use std::path::{Path, PathBuf};

/// Filesystem layout for one training run.
///
/// Layout is `<root_dir>/log/train_<unix-timestamp>/` holding a copy of the
/// config, the `events.jsonl` metrics stream, and `model/bestmodel`.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    run_name: String,
}

impl RunLayout {
    #[must_use]
    pub fn new(root: PathBuf, timestamp: i64) -> Self {
        Self { root, run_name: format!("train_{timestamp}") }
    }

    /// Layout for a run starting now.
    #[must_use]
    pub fn starting_now(root: PathBuf) -> Self {
        Self::new(root, chrono::Utc::now().timestamp())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.log_dir().join(&self.run_name)
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.run_dir().join("model")
    }

    #[must_use]
    pub fn best_model_path(&self) -> PathBuf {
        self.model_dir().join("bestmodel")
    }

    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.run_dir().join("events.jsonl")
    }

    /// Create the run directories and copy the config file into the run dir.
    pub fn create(&self, config_file: &Path) -> TrainingResult<()> {
        let model_dir = self.model_dir();
        std::fs::create_dir_all(&model_dir).map_err(|e| TrainingError::storage(&model_dir, e))?;

        let file_name = config_file.file_name().ok_or_else(|| TrainingError::Config {
            path: config_file.to_path_buf(),
            reason: "config path has no file name".to_string(),
        })?;
        let dest = self.run_dir().join(file_name);
        std::fs::copy(config_file, &dest).map_err(|e| TrainingError::storage(&dest, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::new(PathBuf::from("/data"), 1_700_000_000);
        assert_eq!(layout.run_dir(), PathBuf::from("/data/log/train_1700000000"));
        assert_eq!(
            layout.best_model_path(),
            PathBuf::from("/data/log/train_1700000000/model/bestmodel")
        );
    }

    #[test]
    fn test_create_copies_config() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("cfg.json");
        std::fs::write(&config, "{}").unwrap();

        let layout = RunLayout::new(temp.path().join("root"), 42);
        layout.create(&config).unwrap();

        assert!(layout.model_dir().is_dir());
        assert_eq!(std::fs::read_to_string(layout.run_dir().join("cfg.json")).unwrap(), "{}");
    }

    #[test]
    fn test_create_reports_unwritable_root() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("root");
        std::fs::write(&blocker, "not a dir").unwrap();
        let config = temp.path().join("cfg.json");
        std::fs::write(&config, "{}").unwrap();

        let err = RunLayout::new(blocker, 1).create(&config).unwrap_err();
        assert!(matches!(err, TrainingError::Storage { .. }));
    }
}
