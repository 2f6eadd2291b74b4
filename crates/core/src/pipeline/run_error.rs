use std::io;

use thiserror::Error;

use crate::encoder::domain::encoder_error::EncoderError;
use crate::inference::domain::model_error::ModelError;
use crate::processors::processor_error::ProcessorError;

#[derive(Error, Debug)]
pub enum RunError {
    /// Checked before the target is touched: missing tool or weights, no
    /// face in the reference image, missing frames when reprocessing.
    #[error("{0}")]
    Precondition(String),
    #[error(transparent)]
    Inference(#[from] ModelError),
    #[error(transparent)]
    ExternalTool(#[from] EncoderError),
    #[error("Processing {0} halted: NSFW detected!")]
    ClassificationHalt(&'static str),
    #[error("run cancelled")]
    Cancelled,
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        RunError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<ProcessorError> for RunError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Precondition { .. } => RunError::Precondition(err.to_string()),
            ProcessorError::Model(e) => RunError::Inference(e),
            ProcessorError::ReadFrame { path, message } => {
                RunError::io(format!("reading {}", path.display()), io::Error::other(message))
            }
            ProcessorError::WriteFrame { path, message } => {
                RunError::io(format!("writing {}", path.display()), io::Error::other(message))
            }
            ProcessorError::WorkerPanicked(scope) => {
                RunError::Inference(ModelError::inference(scope, "worker thread panicked"))
            }
            ProcessorError::Cancelled => RunError::Cancelled,
        }
    }
}
