use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;

use faceswap_core::encoder::infrastructure::ffmpeg_cli_encoder::FfmpegCliEncoder;
use faceswap_core::inference::domain::model_provider::ModelProvider;
use faceswap_core::inference::infrastructure::execution_provider::{
    is_known_provider, SessionOptions,
};
use faceswap_core::inference::infrastructure::onnx_model_factory::OnnxModelFactory;
use faceswap_core::media::infrastructure::media_type::is_image;
use faceswap_core::pipeline::run_logger::StdoutRunLogger;
use faceswap_core::pipeline::run_orchestrator::RunOrchestrator;
use faceswap_core::processors::registry::create_processors;
use faceswap_core::shared::run_config::{
    suggest_execution_threads, OutputVideoEncoder, RunConfig, TempFrameFormat,
};

/// Swap a reference face into videos and images, optionally enhancing it.
#[derive(Parser, Debug)]
#[command(name = "faceswap")]
struct Cli {
    /// Target video or image whose faces are replaced.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Image containing the face to swap in.
    #[arg(short, long)]
    reference: Option<PathBuf>,

    /// Output file, or a directory to derive the file name in.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load settings from a JSON file; -i/-r/-o and other flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to a JSON file and exit.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Stages to run, in order: face_swapper, face_enhancer.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    frame_processors: Option<Vec<String>>,

    /// Skip the NSFW check.
    #[arg(long)]
    allow_nsfw: bool,

    /// Keep the target fps instead of resampling to 30.
    #[arg(long)]
    keep_fps: bool,

    /// Keep the extracted frames after the run.
    #[arg(long)]
    keep_frames: bool,

    /// Process frames left by a previous --keep-frames run instead of extracting.
    #[arg(long)]
    reprocess_frames: bool,

    /// Only assemble the video from existing frames.
    #[arg(long)]
    render_only: bool,

    /// Stop after processing frames.
    #[arg(long)]
    skip_video: bool,

    /// Do not copy the target audio into the output.
    #[arg(long)]
    skip_audio: bool,

    /// Swap every detected face instead of the one matching the reference.
    #[arg(long)]
    many_faces: bool,

    /// Which face (left to right) of the reference frame to follow.
    #[arg(long)]
    reference_face_position: Option<usize>,

    /// Frame the followed face is picked from.
    #[arg(long)]
    reference_frame_number: Option<usize>,

    /// Maximum embedding distance for a face to count as the reference.
    #[arg(long)]
    similar_face_distance: Option<f32>,

    /// Image format of extracted frames: png or jpg.
    #[arg(long)]
    temp_frame_format: Option<TempFrameFormat>,

    /// Extraction quality (0 = best, 100 = worst).
    #[arg(long)]
    temp_frame_quality: Option<u8>,

    /// libx264, libx265, libvpx-vp9, h264_nvenc or hevc_nvenc.
    #[arg(long)]
    output_video_encoder: Option<OutputVideoEncoder>,

    /// Output lossiness (0 = lossless, 100 = worst).
    #[arg(long)]
    output_video_lossiness: Option<u8>,

    /// Data segment limit in GB.
    #[arg(long)]
    max_memory: Option<u64>,

    /// Inference backends: cpu, cuda, tensorrt, coreml, directml.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    execution_provider: Option<Vec<String>>,

    /// Frames processed in parallel, also used as intra-op thread count.
    #[arg(long)]
    execution_threads: Option<usize>,

    /// Directory holding the model weights.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Log level passed to ffmpeg.
    #[arg(long)]
    ffmpeg_log_level: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = build_config(cli.config.clone(), &cli)?;

    if let Some(path) = &cli.save_config {
        config.save(path)?;
        log::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    validate(&config)?;
    config.output_path = config.normalized_output_path();

    let cancelled = Arc::new(AtomicBool::new(false));
    watch_interrupt(cancelled.clone())?;

    let options = SessionOptions {
        execution_providers: config.execution_providers.clone(),
        intra_threads: config.execution_threads,
    };
    let models = ModelProvider::new(Box::new(OnnxModelFactory::new(
        config.models_dir.clone(),
        options,
    )));
    let encoder = FfmpegCliEncoder::new(config.ffmpeg_log_level.clone());
    let processors = create_processors(&config.frame_processors)?;

    let mut orchestrator = RunOrchestrator::new(&config, &models, &encoder, processors, cancelled)
        .with_logger(Box::new(StdoutRunLogger::default()));
    orchestrator.pre_check()?;
    limit_resources(config.max_memory);

    let report = orchestrator.run()?;
    match report.output_valid {
        Some(true) => log::info!("Output written to {}", report.output_path.display()),
        Some(false) => log::warn!(
            "Output at {} could not be decoded",
            report.output_path.display()
        ),
        None => {}
    }
    Ok(())
}

/// Starts from the JSON snapshot (or defaults) and applies command-line
/// overrides on top.
fn build_config(file: Option<PathBuf>, cli: &Cli) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = match file {
        Some(path) => RunConfig::load(&path)?,
        None => RunConfig::default(),
    };

    if let Some(path) = &cli.input {
        config.input_path = path.clone();
    }
    if let Some(path) = &cli.reference {
        config.reference_path = path.clone();
    }
    if let Some(path) = &cli.output {
        config.output_path = path.clone();
    }
    if let Some(names) = &cli.frame_processors {
        config.frame_processors = names.clone();
    }

    config.allow_nsfw |= cli.allow_nsfw;
    config.keep_fps |= cli.keep_fps;
    config.keep_frames |= cli.keep_frames;
    config.reprocess_frames |= cli.reprocess_frames;
    config.render_only |= cli.render_only;
    config.skip_video |= cli.skip_video;
    config.skip_audio |= cli.skip_audio;
    config.many_faces |= cli.many_faces;

    if let Some(v) = cli.reference_face_position {
        config.reference_face_position = v;
    }
    if let Some(v) = cli.reference_frame_number {
        config.reference_frame_number = v;
    }
    if let Some(v) = cli.similar_face_distance {
        config.similar_face_distance = v;
    }
    if let Some(v) = cli.temp_frame_format {
        config.temp_frame_format = v;
    }
    if let Some(v) = cli.temp_frame_quality {
        config.temp_frame_quality = v;
    }
    if let Some(v) = cli.output_video_encoder {
        config.output_video_encoder = v;
    }
    if let Some(v) = cli.output_video_lossiness {
        config.output_video_lossiness = v;
    }
    if cli.max_memory.is_some() {
        config.max_memory = cli.max_memory;
    }
    if let Some(providers) = &cli.execution_provider {
        config.execution_providers = providers.clone();
        config.execution_threads = suggest_execution_threads(providers);
    }
    if let Some(v) = cli.execution_threads {
        config.execution_threads = v;
    }
    if cli.models_dir.is_some() {
        config.models_dir = cli.models_dir.clone();
    }
    if let Some(level) = &cli.ffmpeg_log_level {
        config.ffmpeg_log_level = level.clone();
    }
    Ok(config)
}

fn validate(config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let frames_only = config.reprocess_frames || config.render_only;
    if config.input_path.as_os_str().is_empty() {
        return Err("Input file is required (-i/--input)".into());
    }
    if !frames_only && !config.input_path.is_file() {
        return Err(format!("Input file not found: {}", config.input_path.display()).into());
    }
    if config.output_path.as_os_str().is_empty() {
        return Err("Output path is required (-o/--output)".into());
    }
    if !config.render_only
        && !(config.reference_path.is_file() && is_image(&config.reference_path))
    {
        return Err(format!(
            "Reference must be an existing image, got '{}'",
            config.reference_path.display()
        )
        .into());
    }
    if let Some(unknown) = config
        .execution_providers
        .iter()
        .find(|p| !is_known_provider(p))
    {
        return Err(format!(
            "Execution provider must be one of: cpu, cuda, tensorrt, coreml, directml, got '{unknown}'"
        )
        .into());
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Stop,
    ForceExit,
}

/// First Ctrl-C asks the run to stop; any later one while it winds down
/// forces an exit.
fn interrupt(flag: &AtomicBool) -> Interrupt {
    if flag.swap(true, Ordering::SeqCst) {
        Interrupt::ForceExit
    } else {
        Interrupt::Stop
    }
}

/// Sets `flag` on Ctrl-C. The run notices it between stages and frames.
fn watch_interrupt(flag: Arc<AtomicBool>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    match interrupt(&flag) {
                        Interrupt::Stop => log::warn!(
                            "Interrupted, stopping after the current frame (Ctrl-C again to quit)..."
                        ),
                        Interrupt::ForceExit => {
                            log::warn!("Interrupted again, exiting; temporary frames may remain");
                            process::exit(130);
                        }
                    }
                }
            });
        })?;
    Ok(())
}

#[cfg(unix)]
fn limit_resources(max_memory: Option<u64>) {
    let Some(gb) = max_memory else {
        return;
    };
    let bytes = gb.saturating_mul(1024 * 1024 * 1024) as libc::rlim_t;
    let limit = libc::rlimit {
        rlim_cur: bytes,
        rlim_max: bytes,
    };
    // SAFETY: `limit` is a valid rlimit that outlives the call.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_DATA, &limit) };
    if rc != 0 {
        log::warn!(
            "Failed to limit memory to {gb} GB: {}",
            std::io::Error::last_os_error()
        );
    } else {
        log::info!("Memory limited to {gb} GB");
    }
}

#[cfg(not(unix))]
fn limit_resources(max_memory: Option<u64>) {
    if max_memory.is_some() {
        log::warn!("--max-memory is only supported on Unix, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("faceswap").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = parse(&["-i", "in.mp4", "-r", "face.png", "-o", "out.mp4"]);
        let config = build_config(None, &cli).unwrap();
        assert_eq!(config.input_path, PathBuf::from("in.mp4"));
        assert_eq!(config.frame_processors, vec!["face_swapper"]);
        assert_eq!(config.execution_threads, 1);
        assert!(!config.many_faces);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--frame-processors",
            "face_swapper,face_enhancer",
            "--many-faces",
            "--temp-frame-format",
            "jpg",
            "--output-video-encoder",
            "libvpx-vp9",
            "--execution-provider",
            "cuda",
        ]);
        let config = build_config(None, &cli).unwrap();
        assert_eq!(config.frame_processors, vec!["face_swapper", "face_enhancer"]);
        assert!(config.many_faces);
        assert_eq!(config.temp_frame_format, TempFrameFormat::Jpg);
        assert_eq!(config.output_video_encoder, OutputVideoEncoder::LibvpxVp9);
        assert_eq!(config.execution_threads, 8);
    }

    #[test]
    fn test_explicit_threads_win_over_provider_suggestion() {
        let cli = parse(&["--execution-provider", "cuda", "--execution-threads", "3"]);
        assert_eq!(build_config(None, &cli).unwrap().execution_threads, 3);
    }

    #[test]
    fn test_config_file_is_overridden_by_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"input_path": "a.mp4", "output_path": "b.mp4", "keep_fps": true}"#,
        )
        .unwrap();

        let cli = parse(&["-i", "c.mp4"]);
        let config = build_config(Some(path), &cli).unwrap();
        assert_eq!(config.input_path, PathBuf::from("c.mp4"));
        assert_eq!(config.output_path, PathBuf::from("b.mp4"));
        assert!(config.keep_fps);
    }

    #[test]
    fn test_unknown_encoder_is_rejected_by_parser() {
        let args = ["faceswap", "--output-video-encoder", "mpeg1"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_second_interrupt_forces_exit() {
        let flag = AtomicBool::new(false);
        assert_eq!(interrupt(&flag), Interrupt::Stop);
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(interrupt(&flag), Interrupt::ForceExit);
        assert_eq!(interrupt(&flag), Interrupt::ForceExit);
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let config = RunConfig {
            input_path: PathBuf::from("/nonexistent/in.mp4"),
            reference_path: PathBuf::from("face.png"),
            output_path: PathBuf::from("out.mp4"),
            ..RunConfig::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }
}
