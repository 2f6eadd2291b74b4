use std::path::Path;

use crate::encoder::domain::encoder_error::EncoderError;
use crate::shared::run_config::OutputVideoEncoder;

/// Codec choice for reassembling processed frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoEncodeSettings {
    pub encoder: OutputVideoEncoder,
    /// 0 (lossless) to 100.
    pub lossiness: u8,
}

/// External encode/decode tool used to split a video into frame files and
/// to put processed frames (and the original audio) back together.
pub trait MediaEncoder: Send + Sync {
    /// Verifies the tool can be launched at all.
    fn check_available(&self) -> Result<(), EncoderError>;

    /// Frame rate of the first video stream of `input`.
    fn detect_fps(&self, input: &Path) -> Result<f64, EncoderError>;

    /// Writes every frame of `input`, resampled to `fps`, to files matching
    /// `frame_pattern` (e.g. `.../%04d.png`).
    fn extract_frames(
        &self,
        input: &Path,
        frame_pattern: &Path,
        fps: f64,
        quality: u8,
    ) -> Result<(), EncoderError>;

    /// Muxes the frames matching `frame_pattern`, starting at
    /// `first_frame_number`, into a silent video at `output`.
    fn create_video(
        &self,
        frame_pattern: &Path,
        first_frame_number: u64,
        fps: f64,
        settings: &VideoEncodeSettings,
        output: &Path,
    ) -> Result<(), EncoderError>;

    /// Copies the video stream of `video` and the audio of `input` into
    /// `output`. The audio is trimmed to start where frame
    /// `first_frame_number` plays at `fps`.
    fn restore_audio(
        &self,
        video: &Path,
        input: &Path,
        first_frame_number: u64,
        fps: f64,
        output: &Path,
    ) -> Result<(), EncoderError>;
}
