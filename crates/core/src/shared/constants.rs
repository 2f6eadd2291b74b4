pub const FACE_DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_EMBEDDER_MODEL_NAME: &str = "w600k_r50.onnx";
pub const FACE_SWAPPER_MODEL_NAME: &str = "inswapper_128.onnx";
pub const FACE_ENHANCER_MODEL_NAME: &str = "GFPGANv1.4.onnx";
pub const NSFW_MODEL_NAME: &str = "open_nsfw.onnx";

/// Extensions that route a run through the image flow.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Frame rate used for extraction and reassembly unless the source fps is kept.
pub const DEFAULT_FPS: f64 = 30.0;

pub const TEMP_DIRECTORY: &str = "temp";
pub const TEMP_VIDEO_FILE: &str = "temp.mp4";

/// Zero-padded width of extracted frame file names (`0001.png`).
pub const FRAME_NUMBER_WIDTH: usize = 4;

pub const DEFAULT_SIMILAR_FACE_DISTANCE: f32 = 0.85;

/// NSFW probability above which a frame halts the run.
pub const NSFW_THRESHOLD: f32 = 0.85;

/// Every Nth decoded frame is classified when gating a video.
pub const NSFW_VIDEO_SAMPLE_INTERVAL: usize = 100;

/// Padding added around a face box before enhancement, as a fraction of its size.
pub const ENHANCER_PADDING_RATIO: f32 = 0.5;
