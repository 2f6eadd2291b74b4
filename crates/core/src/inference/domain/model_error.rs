use std::fmt::Display;

use thiserror::Error;

use crate::shared::model_resolver::ModelResolveError;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("missing model weights: {0}")]
    MissingWeights(#[from] ModelResolveError),
    #[error("failed to load {model}: {message}")]
    Load { model: String, message: String },
    #[error("{model} inference failed: {message}")]
    Inference { model: String, message: String },
    #[error("model handle lock poisoned")]
    Poisoned,
}

impl ModelError {
    pub fn load(model: &str, err: impl Display) -> Self {
        ModelError::Load {
            model: model.to_string(),
            message: err.to_string(),
        }
    }

    pub fn inference(model: &str, err: impl Display) -> Self {
        ModelError::Inference {
            model: model.to_string(),
            message: err.to_string(),
        }
    }
}
