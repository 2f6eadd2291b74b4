use crate::inference::domain::model_error::ModelError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

/// Finds faces in a frame and computes an identity embedding for each.
pub trait FaceAnalyser: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ModelError>;
}
