use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can leave a pipeline stage.
///
/// Provider and sandbox failures have their own types and are recovered
/// inside their stages; they never show up here.
#[derive(Debug, Error)]
pub enum QaError {
    #[error("source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse {}: {detail}", path.display())]
    Parse { path: PathBuf, detail: String },

    #[error("memory bank {}: {detail}", path.display())]
    Persistence { path: PathBuf, detail: String },

    #[error("config {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },
}

impl QaError {
    pub fn parse(path: &Path, detail: impl Into<String>) -> Self {
        QaError::Parse {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }

    pub fn persistence(path: &Path, detail: impl ToString) -> Self {
        QaError::Persistence {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }

    /// Analysis-stage failures end the run with an `{error}` result instead
    /// of propagating.
    pub fn is_analysis_failure(&self) -> bool {
        matches!(self, QaError::NotFound { .. } | QaError::Parse { .. })
    }
}
