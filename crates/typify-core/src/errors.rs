//! Error types for the typify core library.

use std::path::PathBuf;

/// Top-level error enum for the typify core library.
#[derive(Debug, thiserror::Error)]
pub enum TypifyError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),
}

impl TypifyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TypifyError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures caused by the input file not being valid Python.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, TypifyError::Parse { .. })
    }
}

pub type TypifyResult<T> = Result<T, TypifyError>;
