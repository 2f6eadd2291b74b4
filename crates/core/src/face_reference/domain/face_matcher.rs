use std::cmp::Ordering;

use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::model_error::ModelError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

/// Orders faces left to right by box `x0`, then top to bottom by `y0`.
///
/// The sort is stable, so faces at identical positions keep detector order.
/// Every "face at position N" lookup relies on this ordering.
pub fn sort_faces(faces: &mut [DetectedFace]) {
    faces.sort_by(|a, b| {
        a.bbox
            .x0
            .partial_cmp(&b.bbox.x0)
            .unwrap_or(Ordering::Equal)
            .then(a.bbox.y0.partial_cmp(&b.bbox.y0).unwrap_or(Ordering::Equal))
    });
}

/// Detects all faces in `frame` in canonical order.
pub fn get_many_faces(
    analyser: &dyn FaceAnalyser,
    frame: &Frame,
) -> Result<Vec<DetectedFace>, ModelError> {
    let mut faces = analyser.detect(frame)?;
    sort_faces(&mut faces);
    Ok(faces)
}

/// Face at `position` in canonical order. Out-of-range positions fall back
/// to the last face; `None` only when there are no faces at all.
pub fn pick_face(faces: &[DetectedFace], position: usize) -> Option<&DetectedFace> {
    faces.get(position).or_else(|| faces.last())
}

/// Detects faces in `frame` and returns the one at `position`.
pub fn get_one_face(
    analyser: &dyn FaceAnalyser,
    frame: &Frame,
    position: usize,
) -> Result<Option<DetectedFace>, ModelError> {
    let faces = get_many_faces(analyser, frame)?;
    Ok(pick_face(&faces, position).cloned())
}

/// Nearest face to `reference` by embedding distance, accepted only when
/// the distance is at most `max_distance`.
pub fn nearest_face<'a>(
    faces: &'a [DetectedFace],
    reference: &DetectedFace,
    max_distance: f32,
) -> Option<&'a DetectedFace> {
    faces
        .iter()
        .map(|face| (face, face.distance_to(reference)))
        .filter(|(_, distance)| distance.is_finite())
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .filter(|(_, distance)| *distance <= max_distance)
        .map(|(face, _)| face)
}

/// Detects faces in `frame` and returns the best match for `reference`.
pub fn find_similar_face(
    analyser: &dyn FaceAnalyser,
    frame: &Frame,
    reference: &DetectedFace,
    max_distance: f32,
) -> Result<Option<DetectedFace>, ModelError> {
    let faces = get_many_faces(analyser, frame)?;
    Ok(nearest_face(&faces, reference, max_distance).cloned())
}
