use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::model_error::ModelError;
use crate::inference::infrastructure::execution_provider::{build_session, SessionOptions};
use crate::shared::constants::FACE_ENHANCER_MODEL_NAME;
use crate::shared::frame::Frame;

/// Square resolution the restoration network runs at.
const MODEL_SIZE: u32 = 512;

/// GFPGAN-style face restoration.
///
/// The crop is resized to the network resolution, normalised to `[-1, 1]`,
/// restored, then resized back so the caller can paste it in place.
pub struct OnnxFaceEnhancer {
    session: Mutex<ort::session::Session>,
}

impl OnnxFaceEnhancer {
    pub fn new(model_path: &Path, options: &SessionOptions) -> Result<Self, ModelError> {
        let session = build_session(FACE_ENHANCER_MODEL_NAME, model_path, options)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl FaceEnhancer for OnnxFaceEnhancer {
    fn enhance(&self, crop: &Frame) -> Result<Frame, ModelError> {
        let image = crop
            .to_rgb_image()
            .ok_or_else(|| enhancer_error("crop is not an RGB image"))?;
        let resized = imageops::resize(&image, MODEL_SIZE, MODEL_SIZE, FilterType::Triangle);
        let tensor = ort::value::Tensor::from_array(image_tensor(&resized))
            .map_err(enhancer_error)?;

        let restored = {
            let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(enhancer_error)?;
            if outputs.len() == 0 {
                return Err(enhancer_error("model produced no outputs"));
            }
            let output = outputs[0].try_extract_array::<f32>().map_err(enhancer_error)?;
            let output = output
                .into_dimensionality::<ndarray::Ix4>()
                .map_err(enhancer_error)?;
            tensor_image(output.view())?
        };

        let back = imageops::resize(&restored, crop.width(), crop.height(), FilterType::Triangle);
        Ok(Frame::from_rgb_image(back, crop.index()))
    }
}

fn enhancer_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::inference(FACE_ENHANCER_MODEL_NAME, e)
}

/// RGB image → NCHW tensor in `[-1, 1]`.
fn image_tensor(image: &RgbImage) -> ndarray::Array4<f32> {
    let (w, h) = image.dimensions();
    ndarray::Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        image.get_pixel(x as u32, y as u32)[c] as f32 / 127.5 - 1.0
    })
}

/// NCHW tensor in `[-1, 1]` → RGB image.
fn tensor_image(tensor: ndarray::ArrayView4<'_, f32>) -> Result<RgbImage, ModelError> {
    let (n, c, h, w) = tensor.dim();
    if n == 0 || c != 3 {
        return Err(enhancer_error(format!("unexpected output shape {:?}", tensor.shape())));
    }
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        image::Rgb(std::array::from_fn(|c| {
            ((tensor[[0, c, y, x]].clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
        }))
    }))
}
