use std::path::PathBuf;

use thiserror::Error;

use crate::inference::domain::model_error::ModelError;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("[{scope}] {message}")]
    Precondition { scope: &'static str, message: String },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to read frame {path}: {message}")]
    ReadFrame { path: PathBuf, message: String },
    #[error("failed to write frame {path}: {message}")]
    WriteFrame { path: PathBuf, message: String },
    #[error("{0} worker thread panicked")]
    WorkerPanicked(&'static str),
    #[error("processing cancelled")]
    Cancelled,
}

impl ProcessorError {
    pub fn precondition(scope: &'static str, message: impl Into<String>) -> Self {
        ProcessorError::Precondition {
            scope,
            message: message.into(),
        }
    }
}
