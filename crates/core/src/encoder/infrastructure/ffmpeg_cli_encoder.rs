use std::path::Path;

use crate::encoder::domain::encoder_error::EncoderError;
use crate::encoder::domain::encoding_quality::{
    constant_rate_factor, frame_quality_scale, parse_frame_rate,
};
use crate::encoder::domain::media_encoder::{MediaEncoder, VideoEncodeSettings};
use crate::encoder::infrastructure::command_runner::{CommandRunner, ProcessCommandRunner};
use crate::media::domain::time_index::frame_time_index;
use crate::shared::constants::DEFAULT_FPS;

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Colour conversion applied when muxing RGB frames back to yuv420p.
const COLORSPACE_FILTER: &str = "colorspace=bt709:iall=bt601-6-625:fast=1";

/// [`MediaEncoder`] backed by the `ffmpeg` and `ffprobe` command-line tools.
pub struct FfmpegCliEncoder<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    log_level: String,
}

impl FfmpegCliEncoder<ProcessCommandRunner> {
    pub fn new(log_level: impl Into<String>) -> Self {
        Self::with_runner(ProcessCommandRunner, log_level)
    }
}

impl<R: CommandRunner> FfmpegCliEncoder<R> {
    pub fn with_runner(runner: R, log_level: impl Into<String>) -> Self {
        Self {
            runner,
            log_level: log_level.into(),
        }
    }

    fn run_ffmpeg(&self, args: Vec<String>) -> Result<(), EncoderError> {
        let mut full = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
        ];
        full.extend(args);
        self.runner.run(FFMPEG, &full).map(|_| ())
    }
}

impl<R: CommandRunner> MediaEncoder for FfmpegCliEncoder<R> {
    fn check_available(&self) -> Result<(), EncoderError> {
        self.runner
            .run(FFMPEG, &["-version".to_string()])
            .map(|_| ())
    }

    fn detect_fps(&self, input: &Path) -> Result<f64, EncoderError> {
        let output = self.runner.run(FFPROBE, &probe_fps_args(input))?;
        match parse_frame_rate(&output) {
            Some(fps) => Ok(fps),
            None => {
                log::warn!(
                    "[FFMPEG] could not parse frame rate {:?} for {}, using {DEFAULT_FPS}",
                    output.trim(),
                    input.display()
                );
                Ok(DEFAULT_FPS)
            }
        }
    }

    fn extract_frames(
        &self,
        input: &Path,
        frame_pattern: &Path,
        fps: f64,
        quality: u8,
    ) -> Result<(), EncoderError> {
        self.run_ffmpeg(extract_frames_args(input, frame_pattern, fps, quality))
    }

    fn create_video(
        &self,
        frame_pattern: &Path,
        first_frame_number: u64,
        fps: f64,
        settings: &VideoEncodeSettings,
        output: &Path,
    ) -> Result<(), EncoderError> {
        self.run_ffmpeg(create_video_args(
            frame_pattern,
            first_frame_number,
            fps,
            settings,
            output,
        ))
    }

    fn restore_audio(
        &self,
        video: &Path,
        input: &Path,
        first_frame_number: u64,
        fps: f64,
        output: &Path,
    ) -> Result<(), EncoderError> {
        self.run_ffmpeg(restore_audio_args(
            video,
            input,
            first_frame_number,
            fps,
            output,
        ))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn probe_fps_args(input: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=r_frame_rate",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(path_arg(input));
    args
}

fn extract_frames_args(input: &Path, frame_pattern: &Path, fps: f64, quality: u8) -> Vec<String> {
    vec![
        "-hwaccel".into(),
        "auto".into(),
        "-i".into(),
        path_arg(input),
        "-q:v".into(),
        frame_quality_scale(quality).to_string(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-vf".into(),
        format!("fps={fps}"),
        path_arg(frame_pattern),
    ]
}

fn create_video_args(
    frame_pattern: &Path,
    first_frame_number: u64,
    fps: f64,
    settings: &VideoEncodeSettings,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hwaccel".into(), "auto".into(), "-r".into(), fps.to_string()];
    // The image2 demuxer only probes a few numbers past its start index.
    if first_frame_number > 0 {
        args.push("-start_number".into());
        args.push(first_frame_number.to_string());
    }
    args.extend([
        "-i".to_string(),
        path_arg(frame_pattern),
        "-c:v".to_string(),
        settings.encoder.as_str().to_string(),
        settings.encoder.quality_flag().to_string(),
        constant_rate_factor(settings.lossiness).to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-vf".to_string(),
        COLORSPACE_FILTER.to_string(),
        "-y".to_string(),
        path_arg(output),
    ]);
    args
}

fn restore_audio_args(
    video: &Path,
    input: &Path,
    first_frame_number: u64,
    fps: f64,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-i".into(), path_arg(video)];
    if first_frame_number > 0 {
        args.push("-ss".into());
        args.push(frame_time_index(first_frame_number, fps));
    }
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-shortest".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-y".to_string(),
        path_arg(output),
    ]);
    args
}
