use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::encoder::domain::media_encoder::{MediaEncoder, VideoEncodeSettings};
use crate::face_reference::domain::face_reference_tracker::FaceReferenceTracker;
use crate::inference::domain::model_provider::{Capability, ModelProvider};
use crate::media::domain::frame_sequence::FrameSequence;
use crate::media::domain::time_index::frame_time_index;
use crate::media::infrastructure::ffmpeg_video_inspector::is_decodable_video;
use crate::media::infrastructure::frame_io::is_decodable_image;
use crate::media::infrastructure::media_type::{has_image_extension, MediaKind};
use crate::media::infrastructure::temp_workspace::TempWorkspace;
use crate::pipeline::run_error::RunError;
use crate::pipeline::run_logger::{NullRunLogger, RunLogger};
use crate::pipeline::run_state::RunState;
use crate::processors::frame_processor::{FrameProcessor, ProcessorContext};
use crate::shared::constants::DEFAULT_FPS;
use crate::shared::run_config::RunConfig;

pub const SCOPE: &str = "FACESWAP.CORE";

/// What a finished run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub flow: MediaKind,
    pub output_path: PathBuf,
    /// `None` when no output was expected (video creation skipped).
    pub output_valid: Option<bool>,
}

/// Sequences one run: stage checks, NSFW gate, then the image or video flow.
///
/// Owns the run-scoped reference face; borrows the configuration, the model
/// provider and the encoder. Models are released and temporary frames are
/// cleaned on every exit path.
pub struct RunOrchestrator<'a> {
    config: &'a RunConfig,
    models: &'a ModelProvider,
    encoder: &'a dyn MediaEncoder,
    processors: Vec<Box<dyn FrameProcessor>>,
    reference: FaceReferenceTracker,
    cancelled: Arc<AtomicBool>,
    logger: Mutex<Box<dyn RunLogger>>,
    state: RunState,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        config: &'a RunConfig,
        models: &'a ModelProvider,
        encoder: &'a dyn MediaEncoder,
        processors: Vec<Box<dyn FrameProcessor>>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            models,
            encoder,
            processors,
            reference: FaceReferenceTracker::new(),
            cancelled,
            logger: Mutex::new(Box::new(NullRunLogger)),
            state: RunState::Idle,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn RunLogger>) -> Self {
        self.logger = Mutex::new(logger);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Checks the encode tool and every stage's model weights. Nothing is
    /// loaded or written.
    pub fn pre_check(&self) -> Result<(), RunError> {
        self.encoder
            .check_available()
            .map_err(|e| RunError::Precondition(format!("[{SCOPE}] ffmpeg is not installed: {e}")))?;
        let ctx = self.context();
        for processor in &self.processors {
            processor.pre_check(&ctx)?;
        }
        Ok(())
    }

    /// Runs to `Done` or `Aborted`.
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        self.state = RunState::Idle;
        let result = self.execute();

        match &result {
            Ok(_) => self.state = RunState::Done,
            Err(e) => {
                self.transition(RunState::Aborted);
                self.status(SCOPE, &e.to_string());
                self.clean_up();
            }
        }
        self.models.release_all();
        self.logger().summary();
        result
    }

    fn execute(&mut self) -> Result<RunReport, RunError> {
        if !self.config.render_only {
            let ctx = self.context();
            for processor in &self.processors {
                processor.pre_start(&ctx)?;
            }
        }
        self.check_cancelled()?;

        let flow = if has_image_extension(&self.config.input_path) {
            MediaKind::Image
        } else {
            MediaKind::Video
        };

        self.transition(RunState::NsfwGate);
        self.nsfw_gate(flow)?;
        self.check_cancelled()?;

        match flow {
            MediaKind::Image => {
                self.transition(RunState::ImageFlow);
                self.process_image()
            }
            _ => {
                self.transition(RunState::VideoFlow);
                self.process_video()
            }
        }
    }

    fn nsfw_gate(&self, flow: MediaKind) -> Result<(), RunError> {
        if self.config.allow_nsfw {
            return Ok(());
        }
        self.status(SCOPE, "NSFW check...");
        let input = &self.config.input_path;
        if !input.is_file() {
            return Err(RunError::Precondition(format!(
                "[{SCOPE}] Cannot check {} for NSFW content: file not found",
                input.display()
            )));
        }
        let classifier = self.models.content_classifier()?;
        let restricted = classifier.classify(input)?;
        self.models.release(Capability::ContentClassifier);
        if restricted {
            return Err(RunError::ClassificationHalt(match flow {
                MediaKind::Image => "image",
                _ => "video",
            }));
        }
        Ok(())
    }

    fn process_image(&self) -> Result<RunReport, RunError> {
        let input = &self.config.input_path;
        let output = &self.config.output_path;
        copy_file(input, output)?;

        let ctx = self.context();
        for processor in &self.processors {
            self.status(processor.scope(), "Processing...");
            let start = Instant::now();
            let result = processor.process_image(&ctx, &self.config.reference_path, output, output);
            processor.post_process(&ctx);
            result?;
            self.timing(processor.name(), start);
            self.check_cancelled()?;
        }

        let valid = is_decodable_image(output);
        if valid {
            self.status(SCOPE, "Processing to image succeed!");
        } else {
            self.status(SCOPE, "Processing to image failed!");
        }
        Ok(RunReport {
            flow: MediaKind::Image,
            output_path: output.clone(),
            output_valid: Some(valid),
        })
    }

    fn process_video(&self) -> Result<RunReport, RunError> {
        let config = self.config;
        let input = &config.input_path;
        let output = &config.output_path;
        let workspace = self.workspace();

        let fps = if config.keep_fps {
            self.encoder.detect_fps(input)?
        } else {
            DEFAULT_FPS
        };

        if !config.reprocess_frames && !config.render_only {
            self.status(SCOPE, "Creating temporary directory...");
            workspace
                .create()
                .map_err(|e| RunError::io(format!("creating {}", workspace.directory().display()), e))?;
            self.status(SCOPE, &format!("Extracting frames with {fps} FPS..."));
            let start = Instant::now();
            self.encoder.extract_frames(
                input,
                &workspace.frame_pattern_path(),
                fps,
                config.temp_frame_quality,
            )?;
            self.timing("extract", start);
        } else {
            self.status(SCOPE, "Checking for frames to reprocess and/or render...");
            if !workspace.has_frames() {
                return Err(RunError::Precondition(format!(
                    "[{SCOPE}] Processing video halted: did not find frames to reprocess and/or render"
                )));
            }
        }
        self.check_cancelled()?;

        let frames = workspace
            .frames()
            .map_err(|e| RunError::io(format!("listing {}", workspace.directory().display()), e))?;
        let (Some(first), Some(last)) = (frames.first_frame_number(), frames.last_frame_number())
        else {
            return Err(RunError::Precondition(format!(
                "[{SCOPE}] Frames not found in {}",
                workspace.directory().display()
            )));
        };
        self.status(
            SCOPE,
            &format!(
                "Processing {} frames ({first}..{last}, {} to {})",
                frames.len(),
                frame_time_index(first, fps),
                frame_time_index(last, fps)
            ),
        );

        if !config.render_only {
            self.run_stages(&frames)?;
        }

        if config.skip_video {
            self.status(SCOPE, "Skipping video creation...");
        } else {
            self.create_video(&workspace, first, fps)?;
            self.check_cancelled()?;
            self.attach_audio(&workspace, first, fps)?;
        }

        self.status(SCOPE, "Cleaning temporary resources...");
        workspace
            .clean(config.keep_frames)
            .map_err(|e| RunError::io(format!("cleaning {}", workspace.directory().display()), e))?;

        let output_valid = if config.skip_video {
            None
        } else {
            let valid = is_decodable_video(output);
            if valid {
                self.status(SCOPE, "Processing to video succeed!");
            } else {
                self.status(SCOPE, "Processing to video failed!");
            }
            Some(valid)
        };
        Ok(RunReport {
            flow: MediaKind::Video,
            output_path: output.clone(),
            output_valid,
        })
    }

    /// Runs each stage over the whole sequence before the next one starts.
    fn run_stages(&self, frames: &FrameSequence) -> Result<(), RunError> {
        let ctx = self.context();
        let progress = |done: usize, total: usize| self.logger().progress(done, total);
        for processor in &self.processors {
            self.status(processor.scope(), "Progressing...");
            let start = Instant::now();
            let result =
                processor.process_video(&ctx, &self.config.reference_path, frames, &progress);
            processor.post_process(&ctx);
            result?;
            self.timing(processor.name(), start);
            self.check_cancelled()?;
        }
        Ok(())
    }

    fn create_video(&self, workspace: &TempWorkspace, first: u64, fps: f64) -> Result<(), RunError> {
        self.status(SCOPE, &format!("Creating video with {fps} FPS..."));
        let settings = VideoEncodeSettings {
            encoder: self.config.output_video_encoder,
            lossiness: self.config.output_video_lossiness,
        };
        let start = Instant::now();
        self.encoder.create_video(
            &workspace.frame_pattern_path(),
            first,
            fps,
            &settings,
            &workspace.output_video_path(),
        )?;
        self.timing("encode", start);
        Ok(())
    }

    /// Puts the muxed video at the output path, with the source audio
    /// unless skipped. A failed audio restore falls back to the silent video.
    fn attach_audio(&self, workspace: &TempWorkspace, first: u64, fps: f64) -> Result<(), RunError> {
        let output = &self.config.output_path;
        let move_silent = || {
            workspace
                .move_output_to(output)
                .map_err(|e| RunError::io(format!("moving video to {}", output.display()), e))
        };

        if self.config.skip_audio {
            move_silent()?;
            self.status(SCOPE, "Skipping audio...");
            return Ok(());
        }

        if self.config.keep_fps {
            self.status(SCOPE, "Restoring audio...");
        } else {
            self.status(SCOPE, "Restoring audio might cause issues as fps are not kept...");
        }
        if let Err(e) = self.encoder.restore_audio(
            &workspace.output_video_path(),
            &self.config.input_path,
            first,
            fps,
            output,
        ) {
            log::warn!("[{SCOPE}] Audio restore failed, keeping silent video: {e}");
            move_silent()?;
        }
        Ok(())
    }

    fn clean_up(&self) {
        let workspace = self.workspace();
        if let Err(e) = workspace.clean(self.config.keep_frames) {
            log::warn!(
                "[{SCOPE}] Failed to clean {}: {e}",
                workspace.directory().display()
            );
        }
    }

    fn workspace(&self) -> TempWorkspace {
        TempWorkspace::for_input(&self.config.input_path, self.config.temp_frame_format)
    }

    fn context(&self) -> ProcessorContext<'_> {
        ProcessorContext {
            config: self.config,
            models: self.models,
            reference: &self.reference,
            cancelled: &self.cancelled,
        }
    }

    fn check_cancelled(&self) -> Result<(), RunError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(RunError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid run transition {} -> {next}",
            self.state
        );
        log::debug!("[{SCOPE}] {} -> {next}", self.state);
        self.state = next;
    }

    fn logger(&self) -> std::sync::MutexGuard<'_, Box<dyn RunLogger>> {
        self.logger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, scope: &str, message: &str) {
        self.logger().status(scope, message);
    }

    fn timing(&self, stage: &str, start: Instant) {
        self.logger()
            .timing(stage, start.elapsed().as_secs_f64() * 1000.0);
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), RunError> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| RunError::io(format!("creating {}", parent.display()), e))?;
        }
    }
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| RunError::io(format!("copying {} to {}", from.display(), to.display()), e))
}
