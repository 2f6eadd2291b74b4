/// Identity swapper backed by an inswapper-style ONNX model.
///
/// The target face is aligned to a 128×128 crop, the model re-renders it
/// with the source identity, and the result is feathered back into the
/// frame at the original position.
use std::path::Path;
use std::sync::Mutex;

use crate::inference::domain::face_swapper::FaceSwapper;
use crate::inference::domain::model_error::ModelError;
use crate::inference::infrastructure::alignment::{align_face, paste_back};
use crate::inference::infrastructure::execution_provider::{build_session, SessionOptions};
use crate::inference::infrastructure::onnx_face_analyser::l2_normalize;
use crate::shared::constants::FACE_SWAPPER_MODEL_NAME;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

const CROP_SIZE: u32 = 128;
const EMBEDDING_DIM: usize = 512;

/// Width of the blend ramp at the crop border, in crop pixels.
const FEATHER: f32 = 12.0;

pub struct OnnxFaceSwapper {
    session: Mutex<ort::session::Session>,
    /// Row-major `EMBEDDING_DIM`² projection from ArcFace space to the
    /// swapper's latent space.
    emap: Option<Vec<f32>>,
}

impl OnnxFaceSwapper {
    /// Loads the model and, if present, the `<model>.emap` projection next
    /// to it (raw little-endian f32).
    pub fn new(model_path: &Path, options: &SessionOptions) -> Result<Self, ModelError> {
        let session = build_session(FACE_SWAPPER_MODEL_NAME, model_path, options)?;
        let emap_path = model_path.with_extension("emap");
        let emap = match std::fs::read(&emap_path) {
            Ok(bytes) => Some(parse_emap(&bytes).ok_or_else(|| {
                ModelError::load(
                    FACE_SWAPPER_MODEL_NAME,
                    format!("{} is not a {EMBEDDING_DIM}x{EMBEDDING_DIM} f32 matrix", emap_path.display()),
                )
            })?),
            Err(_) => {
                log::warn!(
                    "No embedding projection at {}, using raw embeddings",
                    emap_path.display()
                );
                None
            }
        };
        Ok(Self {
            session: Mutex::new(session),
            emap,
        })
    }
}

impl FaceSwapper for OnnxFaceSwapper {
    fn swap(
        &self,
        source: &DetectedFace,
        target: &DetectedFace,
        frame: &Frame,
    ) -> Result<Frame, ModelError> {
        let (crop, matrix) = align_face(frame, &target.landmarks, CROP_SIZE);
        let target_tensor = crop_tensor(&crop);
        let latent = source_latent(&source.embedding, self.emap.as_deref());
        let source_tensor = ndarray::Array2::from_shape_vec((1, latent.len()), latent)
            .map_err(swapper_error)?;

        let target_value = ort::value::Tensor::from_array(target_tensor).map_err(swapper_error)?;
        let source_value = ort::value::Tensor::from_array(source_tensor).map_err(swapper_error)?;

        let swapped = {
            let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
            let outputs = session
                .run(ort::inputs!["target" => target_value, "source" => source_value])
                .map_err(swapper_error)?;
            if outputs.len() == 0 {
                return Err(swapper_error("model produced no outputs"));
            }
            let output = outputs[0].try_extract_array::<f32>().map_err(swapper_error)?;
            let output = output
                .into_dimensionality::<ndarray::Ix4>()
                .map_err(swapper_error)?;
            tensor_to_crop(output.view(), frame.index())?
        };

        let mut result = frame.clone();
        paste_back(&mut result, &swapped, &matrix, FEATHER);
        Ok(result)
    }
}

fn swapper_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::inference(FACE_SWAPPER_MODEL_NAME, e)
}

fn parse_emap(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() != EMBEDDING_DIM * EMBEDDING_DIM * 4 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Projects the source embedding through `emap` and re-normalises it.
fn source_latent(embedding: &[f32], emap: Option<&[f32]>) -> Vec<f32> {
    let mut latent = match emap {
        Some(emap) if embedding.len() == EMBEDDING_DIM => (0..EMBEDDING_DIM)
            .map(|col| {
                embedding
                    .iter()
                    .enumerate()
                    .map(|(row, v)| v * emap[row * EMBEDDING_DIM + col])
                    .sum()
            })
            .collect(),
        _ => embedding.to_vec(),
    };
    l2_normalize(&mut latent);
    latent
}

/// RGB crop → NCHW tensor in `[0, 1]`.
fn crop_tensor(crop: &Frame) -> ndarray::Array4<f32> {
    let size = crop.width() as usize;
    let src = crop.as_ndarray();
    ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        src[[y, x, c]] as f32 / 255.0
    })
}

/// NCHW tensor in `[0, 1]` → RGB crop.
fn tensor_to_crop(tensor: ndarray::ArrayView4<'_, f32>, index: usize) -> Result<Frame, ModelError> {
    let (n, c, h, w) = tensor.dim();
    if n == 0 || c != 3 {
        return Err(swapper_error(format!("unexpected output shape {:?}", tensor.shape())));
    }
    let mut data = Vec::with_capacity(h * w * 3);
    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                data.push((tensor[[0, c, y, x]] * 255.0).round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    Ok(Frame::new(data, w as u32, h as u32, 3, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_source_latent_without_emap_is_normalised_copy() {
        let latent = source_latent(&[3.0, 4.0], None);
        assert_abs_diff_eq!(latent[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(latent[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_source_latent_with_identity_emap() {
        let mut emap = vec![0.0f32; EMBEDDING_DIM * EMBEDDING_DIM];
        for i in 0..EMBEDDING_DIM {
            emap[i * EMBEDDING_DIM + i] = 2.0;
        }
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[7] = 1.0;

        let latent = source_latent(&embedding, Some(&emap));
        assert_abs_diff_eq!(latent[7], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(latent.iter().map(|v| v.abs()).sum::<f32>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_emap_checks_size() {
        assert!(parse_emap(&[0u8; 16]).is_none());
        let bytes = vec![0u8; EMBEDDING_DIM * EMBEDDING_DIM * 4];
        assert_eq!(parse_emap(&bytes).unwrap().len(), EMBEDDING_DIM * EMBEDDING_DIM);
    }

    #[test]
    fn test_crop_tensor_round_trip() {
        let mut data = Vec::new();
        for i in 0..(4 * 4) {
            data.extend_from_slice(&[i as u8 * 10, 100, 255]);
        }
        let crop = Frame::new(data, 4, 4, 3, 2);
        let back = tensor_to_crop(crop_tensor(&crop).view(), 2).unwrap();
        assert_eq!(back, crop);
    }

    #[test]
    fn test_tensor_to_crop_rejects_wrong_channel_count() {
        let tensor = ndarray::Array4::<f32>::zeros((1, 4, 8, 8));
        assert!(matches!(
            tensor_to_crop(tensor.view(), 0),
            Err(ModelError::Inference { .. })
        ));
    }
}
