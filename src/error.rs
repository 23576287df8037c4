use std::path::PathBuf;

use thiserror::Error;

use crate::models::UnitKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcript is empty")]
    Segmentation,

    #[error("Completion service call failed: {0}")]
    TransientCall(String),

    #[error("Completion service returned no text")]
    EmptyResponse,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{kind} {} exhausted after {attempts} attempts: {last_error}", .index + 1)]
    Exhausted {
        kind: UnitKind,
        index: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether another attempt within the same unit budget may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientCall(_) | Self::EmptyResponse | Self::MalformedPayload(_)
        )
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
