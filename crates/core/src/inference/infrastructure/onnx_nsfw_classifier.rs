use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::inference::domain::content_classifier::ContentClassifier;
use crate::inference::domain::model_error::ModelError;
use crate::inference::infrastructure::execution_provider::{build_session, SessionOptions};
use crate::media::infrastructure::ffmpeg_video_inspector::sample_frames;
use crate::media::infrastructure::frame_io::read_frame;
use crate::media::infrastructure::media_type::{media_kind, MediaKind};
use crate::shared::constants::{NSFW_MODEL_NAME, NSFW_THRESHOLD, NSFW_VIDEO_SAMPLE_INTERVAL};
use crate::shared::frame::Frame;

const RESIZE_SIZE: u32 = 256;
const INPUT_SIZE: u32 = 224;

/// Per-channel means subtracted in BGR order.
const BGR_MEAN: [f32; 3] = [104.0, 117.0, 123.0];

/// Open NSFW classifier. Images are scored once; videos are sampled every
/// `NSFW_VIDEO_SAMPLE_INTERVAL` frames and flagged if any sample exceeds
/// the threshold.
pub struct OnnxNsfwClassifier {
    session: Mutex<ort::session::Session>,
    channels_first: bool,
    threshold: f32,
}

impl OnnxNsfwClassifier {
    pub fn new(model_path: &Path, options: &SessionOptions) -> Result<Self, ModelError> {
        let session = build_session(NSFW_MODEL_NAME, model_path, options)?;

        // Exported either as NHWC [1, 224, 224, 3] or NCHW [1, 3, 224, 224].
        let channels_first = session
            .inputs()
            .first()
            .map(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } => shape.len() == 4 && shape[1] == 3,
                _ => false,
            })
            .unwrap_or(false);

        Ok(Self {
            session: Mutex::new(session),
            channels_first,
            threshold: NSFW_THRESHOLD,
        })
    }

    fn score(&self, frame: &Frame) -> Result<f32, ModelError> {
        let image = frame
            .to_rgb_image()
            .ok_or_else(|| classifier_error("frame is not an RGB image"))?;
        let tensor = ort::value::Tensor::from_array(input_tensor(&image, self.channels_first))
            .map_err(classifier_error)?;

        let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
        let outputs = session.run(ort::inputs![tensor]).map_err(classifier_error)?;
        if outputs.len() == 0 {
            return Err(classifier_error("model produced no outputs"));
        }
        let probs = outputs[0].try_extract_array::<f32>().map_err(classifier_error)?;
        // [sfw, nsfw]
        probs
            .iter()
            .nth(1)
            .copied()
            .ok_or_else(|| classifier_error("expected two class probabilities"))
    }
}

impl ContentClassifier for OnnxNsfwClassifier {
    fn classify(&self, path: &Path) -> Result<bool, ModelError> {
        match media_kind(path) {
            MediaKind::Image => {
                let frame = read_frame(path, 0).map_err(classifier_error)?;
                let score = self.score(&frame)?;
                log::debug!("NSFW score {score:.3} for {}", path.display());
                Ok(score > self.threshold)
            }
            // Anything not sniffed as an image must decode as video.
            MediaKind::Video | MediaKind::Other => {
                classify_video(path, self.threshold, |frame| self.score(frame))
            }
        }
    }
}

/// True once any sampled frame scores above `threshold`. Files that do
/// not open as video are an error, never a pass.
fn classify_video(
    path: &Path,
    threshold: f32,
    mut score: impl FnMut(&Frame) -> Result<f32, ModelError>,
) -> Result<bool, ModelError> {
    let samples = sample_frames(path, NSFW_VIDEO_SAMPLE_INTERVAL).map_err(classifier_error)?;
    for (i, frame) in samples.enumerate() {
        let value = score(&frame.map_err(classifier_error)?)?;
        if value > threshold {
            log::debug!(
                "NSFW score {value:.3} at frame {} of {}",
                i * NSFW_VIDEO_SAMPLE_INTERVAL,
                path.display()
            );
            return Ok(true);
        }
    }
    Ok(false)
}

fn classifier_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::inference(NSFW_MODEL_NAME, e)
}

/// Resize to 256, centre-crop 224, BGR mean subtraction.
fn input_tensor(image: &RgbImage, channels_first: bool) -> ndarray::Array4<f32> {
    let resized = imageops::resize(image, RESIZE_SIZE, RESIZE_SIZE, FilterType::Triangle);
    let offset = (RESIZE_SIZE - INPUT_SIZE) / 2;
    let crop = imageops::crop_imm(&resized, offset, offset, INPUT_SIZE, INPUT_SIZE).to_image();
    let size = INPUT_SIZE as usize;
    let value = |c: usize, y: usize, x: usize| {
        let bgr = 2 - c;
        crop.get_pixel(x as u32, y as u32)[bgr] as f32 - BGR_MEAN[c]
    };
    if channels_first {
        ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| value(c, y, x))
    } else {
        ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| value(c, y, x))
    }
}
