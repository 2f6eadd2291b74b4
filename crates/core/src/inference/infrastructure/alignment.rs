//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a face to the canonical ArcFace landmark layout before embedding
//! or swapping, and blends the processed crop back into the frame.

use crate::shared::face::Landmarks;
use crate::shared::frame::Frame;

/// ArcFace reference landmarks for a 112×112 crop.
const REFERENCE_LANDMARKS_112: Landmarks = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Row-major 2×3 affine matrix `[a, b, tx, c, d, ty]` mapping frame
/// coordinates to crop coordinates.
pub type AffineMatrix = [f32; 6];

/// Reference landmarks for a square crop of side `size`.
///
/// Multiples of 112 scale the template; other sizes use the 128-pixel
/// layout, which shifts the template right by 8 pixels.
pub fn reference_landmarks(size: u32) -> Landmarks {
    let (ratio, shift_x) = if size % 112 == 0 {
        (size as f32 / 112.0, 0.0)
    } else {
        let ratio = size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * ratio + shift_x, y * ratio))
}

/// Least-squares similarity transform from `src` to `dst` landmarks.
pub fn estimate_similarity_transform(src: &Landmarks, dst: &Landmarks) -> AffineMatrix {
    // Unknowns [a, b, tx, ty] with
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16];
    let mut atb = [0.0f32; 4];

    for ((sx, sy), (dx, dy)) in src.iter().zip(dst) {
        let r1 = [*sx, -sy, 1.0, 0.0];
        let r2 = [*sy, *sx, 0.0, 1.0];
        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i * 4..i * 4 + 4]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let max_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    x
}

/// Inverse of a 2×3 affine matrix, or `None` when it is singular.
pub fn invert_affine(m: &AffineMatrix) -> Option<AffineMatrix> {
    let [a, b, tx, c, d, ty] = *m;
    let det = a * d - b * c;
    if det.abs() < 1e-12 {
        return None;
    }
    let ia = d / det;
    let ib = -b / det;
    let ic = -c / det;
    let id = a / det;
    Some([ia, ib, -(ia * tx + ib * ty), ic, id, -(ic * tx + id * ty)])
}

fn apply(m: &AffineMatrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
}

/// Bilinear sample of channel `c` at `(x, y)`; outside pixels read as 0.
fn sample(frame: &Frame, x: f32, y: f32, c: usize) -> f32 {
    let w = frame.width() as i64;
    let h = frame.height() as i64;
    let channels = frame.channels() as usize;
    let data = frame.data();
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xi: i64, yi: i64| -> f32 {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            data[(yi as usize * w as usize + xi as usize) * channels + c] as f32
        } else {
            0.0
        }
    };

    px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1) * (1.0 - fx) * fy
        + px(x0 + 1, y0 + 1) * fx * fy
}

/// Warps `frame` into a `size`×`size` crop using `m` (frame → crop).
pub fn warp_affine(frame: &Frame, m: &AffineMatrix, size: u32) -> Frame {
    let channels = frame.channels() as usize;
    let n = size as usize;
    let Some(inv) = invert_affine(m) else {
        return Frame::new(vec![0; n * n * channels], size, size, frame.channels(), frame.index());
    };

    let mut out = vec![0u8; n * n * channels];
    for oy in 0..n {
        for ox in 0..n {
            let (sx, sy) = apply(&inv, ox as f32, oy as f32);
            for c in 0..channels {
                out[(oy * n + ox) * channels + c] =
                    sample(frame, sx, sy, c).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Frame::new(out, size, size, frame.channels(), frame.index())
}

/// Aligns the face described by `landmarks` into a square crop of `size`.
///
/// Returns the crop and the frame → crop matrix needed to paste it back.
pub fn align_face(frame: &Frame, landmarks: &Landmarks, size: u32) -> (Frame, AffineMatrix) {
    let m = estimate_similarity_transform(landmarks, &reference_landmarks(size));
    (warp_affine(frame, &m, size), m)
}

/// Blends an aligned crop back into `frame`.
///
/// Every frame pixel whose crop position falls inside the crop is mixed
/// with weight rising linearly from 0 at the crop edge to 1 at `feather`
/// pixels inside it.
pub fn paste_back(frame: &mut Frame, crop: &Frame, m: &AffineMatrix, feather: f32) {
    let Some(inv) = invert_affine(m) else {
        return;
    };
    let size = crop.width() as f32;
    let channels = frame.channels() as usize;
    let fw = frame.width();
    let fh = frame.height();

    // Bounding box of the crop square in frame coordinates.
    let corners = [(0.0, 0.0), (size, 0.0), (0.0, size), (size, size)].map(|(x, y)| apply(&inv, x, y));
    let min_x = corners.iter().map(|p| p.0).fold(f32::MAX, f32::min).floor().max(0.0) as u32;
    let min_y = corners.iter().map(|p| p.1).fold(f32::MAX, f32::min).floor().max(0.0) as u32;
    let max_x = (corners.iter().map(|p| p.0).fold(f32::MIN, f32::max).ceil().max(0.0) as u32).min(fw);
    let max_y = (corners.iter().map(|p| p.1).fold(f32::MIN, f32::max).ceil().max(0.0) as u32).min(fh);

    let feather = feather.max(1.0);
    let data = frame.data_mut();
    for y in min_y..max_y {
        for x in min_x..max_x {
            let (cx, cy) = apply(m, x as f32, y as f32);
            let edge = cx.min(cy).min(size - 1.0 - cx).min(size - 1.0 - cy);
            if edge < 0.0 {
                continue;
            }
            let alpha = (edge / feather).min(1.0);
            let offset = (y as usize * fw as usize + x as usize) * channels;
            for c in 0..channels {
                let src = sample(crop, cx, cy, c);
                let dst = data[offset + c] as f32;
                data[offset + c] = (src * alpha + dst * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 0)
    }

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);
        let expected = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        for (got, want) in m.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert_abs_diff_eq!(m[0], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(m[1], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_reference_landmarks_for_128_are_shifted() {
        let lm = reference_landmarks(128);
        assert_abs_diff_eq!(lm[0].0, 38.2946 + 8.0, epsilon = 1e-4);
        assert_abs_diff_eq!(lm[0].1, 51.6963, epsilon = 1e-4);
        assert_eq!(reference_landmarks(112), REFERENCE_LANDMARKS_112);
    }

    #[test]
    fn test_invert_affine_round_trip() {
        let m = [0.8, -0.3, 12.0, 0.3, 0.8, -4.0];
        let inv = invert_affine(&m).unwrap();
        let (x, y) = apply(&m, 17.0, 42.0);
        let (bx, by) = apply(&inv, x, y);
        assert_abs_diff_eq!(bx, 17.0, epsilon = 1e-3);
        assert_abs_diff_eq!(by, 42.0, epsilon = 1e-3);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        assert!(invert_affine(&[0.0; 6]).is_none());
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = solid(320, 240, 90);
        let (crop, _) = align_face(&frame, &REFERENCE_LANDMARKS_112, 128);
        assert_eq!((crop.width(), crop.height(), crop.channels()), (128, 128, 3));
    }

    #[test]
    fn test_landmark_lands_on_reference_position() {
        let mut frame = solid(200, 200, 0);
        let src: Landmarks = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        let patch = solid(5, 5, 255);
        frame.paste(&patch, 78, 58);

        let (crop, _) = align_face(&frame, &src, 112);
        let rx = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as usize;
        let arr = crop.as_ndarray();
        let max = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (y, x)))
            .map(|(y, x)| arr[[y, x, 0]])
            .max()
            .unwrap();
        assert!(max > 100, "expected bright patch near ({rx}, {ry}), max={max}");
    }

    #[test]
    fn test_paste_back_only_touches_face_area() {
        let mut frame = solid(200, 200, 0);
        let landmarks = REFERENCE_LANDMARKS_112.map(|(x, y)| (x + 40.0, y + 40.0));
        let (_, m) = align_face(&frame, &landmarks, 112);
        let white = solid(112, 112, 255);

        paste_back(&mut frame, &white, &m, 4.0);

        let arr = frame.as_ndarray();
        assert_eq!(arr[[96, 96, 0]], 255);
        assert_eq!(arr[[5, 5, 0]], 0);
        assert_eq!(arr[[195, 195, 0]], 0);
    }
}
