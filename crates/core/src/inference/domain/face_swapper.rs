use crate::inference::domain::model_error::ModelError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

/// Replaces the identity of `target` in `frame` with that of `source`.
///
/// Returns a full frame of the same size; pixels outside the target face
/// are unchanged.
pub trait FaceSwapper: Send + Sync {
    fn swap(
        &self,
        source: &DetectedFace,
        target: &DetectedFace,
        frame: &Frame,
    ) -> Result<Frame, ModelError>;
}
