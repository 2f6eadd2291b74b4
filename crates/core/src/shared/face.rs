/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Integer crop rectangle `(x0, y0, x1, y1)` grown by `ratio` of the box
    /// size on every side and clamped to the frame.
    ///
    /// Coordinates are truncated before padding. Returns `None` when the
    /// clamped rectangle is empty.
    pub fn padded_pixel_rect(
        &self,
        ratio: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0 as i64;
        let y0 = self.y0 as i64;
        let x1 = self.x1 as i64;
        let y1 = self.y1 as i64;
        let pad_x = ((x1 - x0) as f32 * ratio) as i64;
        let pad_y = ((y1 - y0) as f32 * ratio) as i64;

        let left = (x0 - pad_x).clamp(0, frame_width as i64) as u32;
        let top = (y0 - pad_y).clamp(0, frame_height as i64) as u32;
        let right = (x1 + pad_x).clamp(0, frame_width as i64) as u32;
        let bottom = (y1 + pad_y).clamp(0, frame_height as i64) as u32;

        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, right, bottom))
    }
}

/// Five facial keypoints: left eye, right eye, nose, left mouth, right mouth.
pub type Landmarks = [(f32, f32); 5];

/// One face found by the analyser in a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub score: f32,
    /// L2-normalised identity embedding.
    pub embedding: Vec<f32>,
}

impl DetectedFace {
    /// Sum of squared differences between the two embeddings.
    ///
    /// For unit vectors this lies in `[0, 4]`; identical identities give 0.
    /// Missing or mismatched embeddings are infinitely far apart.
    pub fn distance_to(&self, other: &DetectedFace) -> f32 {
        if self.embedding.is_empty() || self.embedding.len() != other.embedding.len() {
            return f32::INFINITY;
        }
        self.embedding
            .iter()
            .zip(&other.embedding)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::face_at;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_dimensions() {
        let b = BoundingBox::new(10.0, 20.0, 50.0, 80.0);
        assert_relative_eq!(b.width(), 40.0);
        assert_relative_eq!(b.height(), 60.0);
    }

    #[test]
    fn test_padded_rect_grows_by_half_each_side() {
        let b = BoundingBox::new(100.0, 100.0, 140.0, 160.0);
        assert_eq!(b.padded_pixel_rect(0.5, 1000, 1000), Some((80, 70, 160, 190)));
    }

    #[test]
    fn test_padded_rect_clamps_to_frame() {
        let b = BoundingBox::new(5.0, 5.0, 45.0, 45.0);
        assert_eq!(b.padded_pixel_rect(0.5, 50, 50), Some((0, 0, 50, 50)));
    }

    #[test]
    fn test_padded_rect_truncates_coordinates() {
        let b = BoundingBox::new(10.9, 10.9, 20.9, 20.9);
        assert_eq!(b.padded_pixel_rect(0.0, 100, 100), Some((10, 10, 20, 20)));
    }

    #[test]
    fn test_padded_rect_outside_frame_is_none() {
        let b = BoundingBox::new(200.0, 200.0, 240.0, 240.0);
        assert_eq!(b.padded_pixel_rect(0.5, 100, 100), None);
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let a = face_at(0.0, 0.3);
        assert_relative_eq!(a.distance_to(&a.clone()), 0.0);
    }

    #[test]
    fn test_distance_opposite_unit_vectors_is_four() {
        let a = face_at(0.0, 0.0);
        let b = face_at(0.0, std::f32::consts::PI);
        assert_relative_eq!(a.distance_to(&b), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = face_at(0.0, 0.2);
        let b = face_at(0.0, 1.1);
        assert_relative_eq!(a.distance_to(&b), b.distance_to(&a));
    }

    #[test]
    fn test_distance_mismatched_embeddings_never_match() {
        let a = face_at(0.0, 0.0);
        let mut longer = a.clone();
        longer.embedding.push(0.0);
        let mut empty = a.clone();
        empty.embedding.clear();

        assert!(a.distance_to(&longer).is_infinite());
        assert!(empty.distance_to(&empty.clone()).is_infinite());
        assert!(a.distance_to(&empty).is_infinite());
    }
}
