use crate::inference::domain::model_error::ModelError;
use crate::shared::frame::Frame;

/// Restores a cropped face. The result has the same size as the input.
pub trait FaceEnhancer: Send + Sync {
    fn enhance(&self, crop: &Frame) -> Result<Frame, ModelError>;
}
