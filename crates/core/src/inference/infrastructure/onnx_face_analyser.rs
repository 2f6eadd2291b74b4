/// Face analyser using ONNX Runtime via `ort`.
///
/// Detection is a YOLO pose model (letterbox preprocessing, NMS, five
/// keypoints). Each detected face is then aligned to 112×112 and embedded
/// with an ArcFace model.
use std::path::Path;
use std::sync::Mutex;

use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::model_error::ModelError;
use crate::inference::infrastructure::alignment::align_face;
use crate::inference::infrastructure::execution_provider::{build_session, SessionOptions};
use crate::shared::constants::{FACE_DETECTOR_MODEL_NAME, FACE_EMBEDDER_MODEL_NAME};
use crate::shared::face::{BoundingBox, DetectedFace, Landmarks};
use crate::shared::frame::Frame;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.45;

/// 5 landmarks × (x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

const KEYPOINT_CONF_THRESH: f64 = 0.5;

const EMBED_SIZE: u32 = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceAnalyser {
    detector: Mutex<ort::session::Session>,
    embedder: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceAnalyser {
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        options: &SessionOptions,
    ) -> Result<Self, ModelError> {
        let detector = build_session(FACE_DETECTOR_MODEL_NAME, detector_path, options)?;
        let embedder = build_session(FACE_EMBEDDER_MODEL_NAME, embedder_path, options)?;

        // NCHW: [1, 3, H, W]; dynamic shapes report -1.
        let input_size = detector
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            confidence: DEFAULT_CONFIDENCE,
            input_size,
        })
    }

    fn detect_boxes(&self, frame: &Frame) -> Result<Vec<RawDetection>, ModelError> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(detector_error)?;

        let mut session = self.detector.lock().map_err(|_| ModelError::Poisoned)?;
        let outputs = session.run(ort::inputs![input_value]).map_err(detector_error)?;
        if outputs.len() == 0 {
            return Err(detector_error("model produced no outputs"));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(detector_error)?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(detector_error(format!("unexpected output shape {shape:?}")));
        }
        // [1, features, detections] or [1, detections, features]
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor
            .as_slice()
            .ok_or_else(|| detector_error("non-contiguous output tensor"))?;

        let mut raw = Vec::new();
        for i in 0..num_dets {
            let row: Vec<f32> = if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };
            if let Some(det) =
                parse_detection(&row, self.confidence, scale, pad_x as f64, pad_y as f64)
            {
                raw.push(det);
            }
        }
        Ok(nms(&mut raw, NMS_IOU_THRESH))
    }

    fn embed(&self, frame: &Frame, landmarks: &Landmarks) -> Result<Vec<f32>, ModelError> {
        let (aligned, _) = align_face(frame, landmarks, EMBED_SIZE);
        let input_value = ort::value::Tensor::from_array(embedding_tensor(&aligned)).map_err(embedder_error)?;

        let mut session = self.embedder.lock().map_err(|_| ModelError::Poisoned)?;
        let outputs = session.run(ort::inputs![input_value]).map_err(embedder_error)?;
        if outputs.len() == 0 {
            return Err(embedder_error("model produced no outputs"));
        }
        let embedding = outputs[0].try_extract_array::<f32>().map_err(embedder_error)?;
        unit_embedding(embedding.iter().copied().collect())
    }
}

impl FaceAnalyser for OnnxFaceAnalyser {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ModelError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        self.detect_boxes(frame)?
            .into_iter()
            .map(|det| {
                let bbox = BoundingBox::new(det.x1 as f32, det.y1 as f32, det.x2 as f32, det.y2 as f32);
                let landmarks = det
                    .keypoints
                    .unwrap_or_else(|| landmarks_from_box(&bbox));
                let embedding = self.embed(frame, &landmarks)?;
                Ok(DetectedFace {
                    bbox,
                    landmarks,
                    score: det.confidence as f32,
                    embedding,
                })
            })
            .collect()
    }
}

fn detector_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::inference(FACE_DETECTOR_MODEL_NAME, e)
}

fn embedder_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::inference(FACE_EMBEDDER_MODEL_NAME, e)
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 grey padding (YOLO convention)
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

/// Aligned RGB crop → normalised NCHW tensor.
fn embedding_tensor(aligned: &Frame) -> ndarray::Array4<f32> {
    let size = aligned.width() as usize;
    let src = aligned.as_ndarray();
    ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        (src[[y, x, c]] as f32 - NORM_MEAN) / NORM_STD
    })
}

/// L2-normalised identity vector; an empty output is a model failure.
fn unit_embedding(mut values: Vec<f32>) -> Result<Vec<f32>, ModelError> {
    if values.is_empty() {
        return Err(embedder_error("model produced an empty embedding"));
    }
    l2_normalize(&mut values);
    Ok(values)
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Approximate keypoints from the box when the detector reports none.
fn landmarks_from_box(bbox: &BoundingBox) -> Landmarks {
    const RELATIVE: Landmarks = [
        (0.31, 0.40),
        (0.69, 0.40),
        (0.50, 0.58),
        (0.35, 0.78),
        (0.65, 0.78),
    ];
    RELATIVE.map(|(rx, ry)| (bbox.x0 + rx * bbox.width(), bbox.y0 + ry * bbox.height()))
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    keypoints: Option<Landmarks>,
}

/// Decodes one output row `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`
/// into frame coordinates. Keypoints are kept only if all five are visible.
fn parse_detection(
    row: &[f32],
    confidence: f64,
    scale: f64,
    pad_x: f64,
    pad_y: f64,
) -> Option<RawDetection> {
    if row.len() < 5 {
        return None;
    }
    let conf = row[4] as f64;
    if conf < confidence {
        return None;
    }
    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let unmap_x = |x: f64| (x - pad_x) / scale;
    let unmap_y = |y: f64| (y - pad_y) / scale;

    let keypoints = if row.len() >= 5 + NUM_KEYPOINT_VALUES {
        let mut pts: Landmarks = [(0.0, 0.0); 5];
        let mut visible = true;
        for (k, pt) in pts.iter_mut().enumerate() {
            let base = 5 + k * 3;
            visible &= row[base + 2] as f64 >= KEYPOINT_CONF_THRESH;
            *pt = (
                unmap_x(row[base] as f64) as f32,
                unmap_y(row[base + 1] as f64) as f32,
            );
        }
        visible.then_some(pts)
    } else {
        None
    };

    Some(RawDetection {
        x1: unmap_x(cx - w / 2.0),
        y1: unmap_y(cy - h / 2.0),
        x2: unmap_x(cx + w / 2.0),
        y2: unmap_y(cy + h / 2.0),
        confidence: conf,
        keypoints,
    })
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        let overlaps = keep.iter().any(|k| {
            bbox_iou(&[k.x1, k.y1, k.x2, k.y2], &[det.x1, det.y1, det.x2, det.y2]) > iou_thresh
        });
        if !overlaps {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            keypoints: None,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_abs_diff_eq!(scale, 3.2, epsilon = 0.01);
        assert_eq!((pad_x, pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, _, _, pad_y) = letterbox(&frame, 640);

        assert_abs_diff_eq!(tensor[[0, 0, pad_y as usize + 1, 1]], 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(tensor[[0, 0, 0, 0]], 114.0 / 255.0, epsilon = 0.01);
    }

    #[test]
    fn test_parse_detection_unmaps_letterbox() {
        // Box centred at (320, 320) 100×100 in a letterbox with scale 2, pad_y 160.
        let row = [320.0, 320.0, 100.0, 100.0, 0.9];
        let d = parse_detection(&row, 0.5, 2.0, 0.0, 160.0).unwrap();
        assert_abs_diff_eq!(d.x1, 135.0);
        assert_abs_diff_eq!(d.y1, 55.0);
        assert_abs_diff_eq!(d.x2, 185.0);
        assert_abs_diff_eq!(d.y2, 105.0);
        assert!(d.keypoints.is_none());
    }

    #[test]
    fn test_parse_detection_below_confidence_is_dropped() {
        assert!(parse_detection(&[10.0, 10.0, 5.0, 5.0, 0.2], 0.5, 1.0, 0.0, 0.0).is_none());
    }

    #[test]
    fn test_parse_detection_requires_all_keypoints_visible() {
        let mut row = vec![50.0, 50.0, 20.0, 20.0, 0.9];
        for k in 0..5 {
            row.extend([40.0 + k as f32, 45.0, 0.9]);
        }
        let d = parse_detection(&row, 0.5, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(d.keypoints.unwrap()[2], (42.0, 45.0));

        row[5 + 3 * 3 + 2] = 0.1;
        let d = parse_detection(&row, 0.5, 1.0, 0.0, 0.0).unwrap();
        assert!(d.keypoints.is_none());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![det(0.0, 0.0, 100.0, 100.0, 0.8), det(5.0, 5.0, 105.0, 105.0, 0.9)];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_abs_diff_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![det(0.0, 0.0, 50.0, 50.0, 0.9), det(200.0, 200.0, 250.0, 250.0, 0.8)];
        assert_eq!(nms(&mut dets, 0.3).len(), 2);
    }

    #[test]
    fn test_bbox_iou() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_abs_diff_eq!(bbox_iou(&b, &b), 1.0);
        assert_eq!(bbox_iou(&b, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_unit_embedding_normalizes() {
        let v = unit_embedding(vec![3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_unit_embedding_rejects_empty_output() {
        assert!(matches!(
            unit_embedding(Vec::new()),
            Err(ModelError::Inference { .. })
        ));
    }

    #[test]
    fn test_embedding_tensor_normalization() {
        let aligned = Frame::new(vec![255u8; 112 * 112 * 3], 112, 112, 3, 0);
        let t = embedding_tensor(&aligned);
        assert_eq!(t.shape(), &[1, 3, 112, 112]);
        assert_abs_diff_eq!(t[[0, 2, 5, 5]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_landmarks_from_box_stay_inside_box() {
        let bbox = BoundingBox::new(10.0, 20.0, 110.0, 140.0);
        for (x, y) in landmarks_from_box(&bbox) {
            assert!(x > bbox.x0 && x < bbox.x1);
            assert!(y > bbox.y0 && y < bbox.y1);
        }
    }
}
