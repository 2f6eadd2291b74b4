use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::face_reference::domain::face_reference_tracker::FaceReferenceTracker;
use crate::inference::domain::model_provider::ModelProvider;
use crate::media::domain::frame_sequence::{frame_number, FrameSequence};
use crate::media::infrastructure::frame_io::{read_frame, write_frame};
use crate::media::infrastructure::media_type::{is_image, is_video};
use crate::media::infrastructure::temp_workspace::TempWorkspace;
use crate::processors::processor_error::ProcessorError;
use crate::shared::frame::Frame;
use crate::shared::run_config::RunConfig;

/// Everything a stage may read during a run. Owned by the orchestrator and
/// lent to each stage call.
pub struct ProcessorContext<'a> {
    pub config: &'a RunConfig,
    pub models: &'a ModelProvider,
    pub reference: &'a FaceReferenceTracker,
    pub cancelled: &'a AtomicBool,
}

/// Called with `(completed, total)` after each frame.
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// One named stage of the frame pipeline.
///
/// Lifecycle per run: `pre_check` and `pre_start` before any stage
/// processes anything, then `process_image` or `process_video`, then
/// `post_process`, which the orchestrator calls even when processing fails.
pub trait FrameProcessor: Send + Sync {
    /// Identifier used in configuration, e.g. `face_swapper`.
    fn name(&self) -> &'static str;

    /// Status scope, e.g. `FACESWAP.FACE-SWAPPER`.
    fn scope(&self) -> &'static str;

    /// Checks that the stage's model weights are available.
    fn pre_check(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError>;

    /// Checks run-specific inputs before anything is modified.
    fn pre_start(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError>;

    /// Processes `input_path` into `output_path`. The two may be the same file.
    fn process_image(
        &self,
        ctx: &ProcessorContext<'_>,
        reference_path: &Path,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), ProcessorError>;

    /// Processes every frame file in place.
    fn process_video(
        &self,
        ctx: &ProcessorContext<'_>,
        reference_path: &Path,
        frames: &FrameSequence,
        progress: ProgressCallback<'_>,
    ) -> Result<(), ProcessorError>;

    /// Releases the stage's models and the tracked reference face.
    fn post_process(&self, ctx: &ProcessorContext<'_>);
}

/// Shared `pre_start` target check: either the extracted frames must exist
/// (reprocessing) or the input must be an image or video.
pub(crate) fn check_target(scope: &'static str, config: &RunConfig) -> Result<(), ProcessorError> {
    if config.reprocess_frames {
        let workspace = TempWorkspace::for_input(&config.input_path, config.temp_frame_format);
        if !workspace.exists() {
            return Err(ProcessorError::precondition(
                scope,
                format!(
                    "Extracted video frames cannot be found in: {}",
                    workspace.directory().display()
                ),
            ));
        }
    } else if !is_image(&config.input_path) && !is_video(&config.input_path) {
        return Err(ProcessorError::precondition(
            scope,
            "Select an image or video for target path",
        ));
    }
    Ok(())
}

/// Reads a frame file, indexing it by the number in its file name.
pub(crate) fn load_frame(path: &Path) -> Result<Frame, ProcessorError> {
    let index = frame_number(path).unwrap_or(0) as usize;
    read_frame(path, index).map_err(|e| ProcessorError::ReadFrame {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub(crate) fn store_frame(path: &Path, frame: &Frame) -> Result<(), ProcessorError> {
    write_frame(path, frame).map_err(|e| ProcessorError::WriteFrame {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Writes `result` to `output_path`, or makes sure the output holds the
/// untouched input when the stage changed nothing.
pub(crate) fn finish_image(
    input_path: &Path,
    output_path: &Path,
    result: Option<Frame>,
) -> Result<(), ProcessorError> {
    match result {
        Some(frame) => store_frame(output_path, &frame),
        None if input_path != output_path => std::fs::copy(input_path, output_path)
            .map(|_| ())
            .map_err(|e| ProcessorError::WriteFrame {
                path: output_path.to_path_buf(),
                message: e.to_string(),
            }),
        None => Ok(()),
    }
}
