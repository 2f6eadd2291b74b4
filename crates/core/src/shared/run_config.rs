use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::DEFAULT_SIMILAR_FACE_DISTANCE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Image format of extracted frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempFrameFormat {
    #[default]
    Png,
    Jpg,
}

impl TempFrameFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TempFrameFormat::Png => "png",
            TempFrameFormat::Jpg => "jpg",
        }
    }
}

impl fmt::Display for TempFrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TempFrameFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "png" => Ok(TempFrameFormat::Png),
            "jpg" => Ok(TempFrameFormat::Jpg),
            other => Err(ConfigError::Invalid(format!(
                "unknown temp frame format: {other} (expected png or jpg)"
            ))),
        }
    }
}

/// Encoder used when reassembling frames into a video.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputVideoEncoder {
    #[default]
    #[serde(rename = "libx264")]
    Libx264,
    #[serde(rename = "libx265")]
    Libx265,
    #[serde(rename = "libvpx-vp9")]
    LibvpxVp9,
    #[serde(rename = "h264_nvenc")]
    H264Nvenc,
    #[serde(rename = "hevc_nvenc")]
    HevcNvenc,
}

impl OutputVideoEncoder {
    pub const ALL: [OutputVideoEncoder; 5] = [
        OutputVideoEncoder::Libx264,
        OutputVideoEncoder::Libx265,
        OutputVideoEncoder::LibvpxVp9,
        OutputVideoEncoder::H264Nvenc,
        OutputVideoEncoder::HevcNvenc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputVideoEncoder::Libx264 => "libx264",
            OutputVideoEncoder::Libx265 => "libx265",
            OutputVideoEncoder::LibvpxVp9 => "libvpx-vp9",
            OutputVideoEncoder::H264Nvenc => "h264_nvenc",
            OutputVideoEncoder::HevcNvenc => "hevc_nvenc",
        }
    }

    /// ffmpeg option that carries the constant-quality value for this encoder.
    pub fn quality_flag(self) -> &'static str {
        match self {
            OutputVideoEncoder::H264Nvenc | OutputVideoEncoder::HevcNvenc => "-cq",
            _ => "-crf",
        }
    }
}

impl fmt::Display for OutputVideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputVideoEncoder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown output video encoder: {s}")))
    }
}

/// Configuration snapshot for one run.
///
/// Built once by the CLI (flags or a JSON file) and passed by reference to
/// every component; nothing mutates it after the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input_path: PathBuf,
    pub reference_path: PathBuf,
    pub output_path: PathBuf,
    pub frame_processors: Vec<String>,
    pub allow_nsfw: bool,
    pub keep_fps: bool,
    pub keep_frames: bool,
    pub reprocess_frames: bool,
    pub render_only: bool,
    pub skip_video: bool,
    pub skip_audio: bool,
    pub many_faces: bool,
    pub reference_face_position: usize,
    pub reference_frame_number: usize,
    pub similar_face_distance: f32,
    pub temp_frame_format: TempFrameFormat,
    pub temp_frame_quality: u8,
    pub output_video_encoder: OutputVideoEncoder,
    pub output_video_lossiness: u8,
    /// Data segment limit in GB.
    pub max_memory: Option<u64>,
    pub execution_providers: Vec<String>,
    pub execution_threads: usize,
    pub models_dir: Option<PathBuf>,
    pub ffmpeg_log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        let execution_providers = vec!["cpu".to_string()];
        Self {
            input_path: PathBuf::new(),
            reference_path: PathBuf::new(),
            output_path: PathBuf::new(),
            frame_processors: vec!["face_swapper".to_string()],
            allow_nsfw: false,
            keep_fps: false,
            keep_frames: false,
            reprocess_frames: false,
            render_only: false,
            skip_video: false,
            skip_audio: false,
            many_faces: false,
            reference_face_position: 0,
            reference_frame_number: 0,
            similar_face_distance: DEFAULT_SIMILAR_FACE_DISTANCE,
            temp_frame_format: TempFrameFormat::Png,
            temp_frame_quality: 0,
            output_video_encoder: OutputVideoEncoder::Libx264,
            output_video_lossiness: 35,
            max_memory: None,
            execution_threads: suggest_execution_threads(&execution_providers),
            execution_providers,
            models_dir: None,
            ffmpeg_log_level: "error".to_string(),
        }
    }
}

/// Default worker count: CUDA sessions benefit from feeding several frames
/// at once, CPU sessions already use all cores internally.
pub fn suggest_execution_threads(execution_providers: &[String]) -> usize {
    if execution_providers.iter().any(|p| p.eq_ignore_ascii_case("cuda")) {
        8
    } else {
        1
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temp_frame_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "temp_frame_quality must be 0-100, got {}",
                self.temp_frame_quality
            )));
        }
        if self.output_video_lossiness > 100 {
            return Err(ConfigError::Invalid(format!(
                "output_video_lossiness must be 0-100, got {}",
                self.output_video_lossiness
            )));
        }
        if !self.similar_face_distance.is_finite() || self.similar_face_distance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "similar_face_distance must be a positive number, got {}",
                self.similar_face_distance
            )));
        }
        if self.execution_threads == 0 {
            return Err(ConfigError::Invalid(
                "execution_threads must be at least 1".to_string(),
            ));
        }
        if self.frame_processors.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one frame processor is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Output file path, expanded when the configured output is a directory.
    ///
    /// A directory output becomes `<dir>/<reference-stem>-<input-stem><input-ext>`.
    pub fn normalized_output_path(&self) -> PathBuf {
        if !self.output_path.is_dir() {
            return self.output_path.clone();
        }
        let reference_stem = file_stem(&self.reference_path);
        let input_stem = file_stem(&self.input_path);
        let extension = self
            .input_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.output_path
            .join(format!("{reference_stem}-{input_stem}{extension}"))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
