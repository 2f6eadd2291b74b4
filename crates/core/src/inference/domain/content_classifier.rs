use std::path::Path;

use crate::inference::domain::model_error::ModelError;

/// Yes/no gate on the content of an image or video file.
pub trait ContentClassifier: Send + Sync {
    /// True when the file is classified as NSFW and must not be processed.
    fn classify(&self, path: &Path) -> Result<bool, ModelError>;
}
