use std::path::Path;

use crate::face_reference::domain::face_matcher::{find_similar_face, get_many_faces, get_one_face};
use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::face_swapper::FaceSwapper;
use crate::inference::domain::model_provider::Capability;
use crate::media::domain::frame_sequence::FrameSequence;
use crate::media::infrastructure::frame_io::read_frame;
use crate::media::infrastructure::media_type::is_image;
use crate::processors::frame_processor::{
    check_target, finish_image, load_frame, store_frame, FrameProcessor, ProcessorContext,
    ProgressCallback,
};
use crate::processors::infrastructure::frame_executor::FrameExecutor;
use crate::processors::processor_error::ProcessorError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

pub const NAME: &str = "face_swapper";
pub const SCOPE: &str = "FACESWAP.FACE-SWAPPER";

/// Replaces faces in each frame with the identity from the reference image.
///
/// In many-faces mode every detected face is swapped. Otherwise only the
/// face closest to the tracked reference face is swapped, and frames with
/// no face within `similar_face_distance` are left untouched.
#[derive(Default)]
pub struct FaceSwapperProcessor;

impl FaceSwapperProcessor {
    pub fn new() -> Self {
        Self
    }

    /// The single face of the reference image that supplies the identity.
    fn source_face(
        &self,
        analyser: &dyn FaceAnalyser,
        reference_path: &Path,
    ) -> Result<DetectedFace, ProcessorError> {
        let frame = read_frame(reference_path, 0).map_err(|e| ProcessorError::ReadFrame {
            path: reference_path.to_path_buf(),
            message: e.to_string(),
        })?;
        get_one_face(analyser, &frame, 0)?.ok_or_else(|| {
            ProcessorError::precondition(SCOPE, "No face in reference path detected")
        })
    }

    /// Returns the swapped frame, or `None` when nothing was swapped.
    fn process_frame(
        &self,
        ctx: &ProcessorContext<'_>,
        analyser: &dyn FaceAnalyser,
        swapper: &dyn FaceSwapper,
        source: &DetectedFace,
        reference: Option<&DetectedFace>,
        frame: Frame,
    ) -> Result<Option<Frame>, ProcessorError> {
        if ctx.config.many_faces {
            let targets = get_many_faces(analyser, &frame)?;
            if targets.is_empty() {
                return Ok(None);
            }
            let mut frame = frame;
            for target in &targets {
                frame = swapper.swap(source, target, &frame)?;
            }
            return Ok(Some(frame));
        }

        let Some(reference) = reference else {
            return Ok(None);
        };
        match find_similar_face(analyser, &frame, reference, ctx.config.similar_face_distance)? {
            Some(target) => Ok(Some(swapper.swap(source, &target, &frame)?)),
            None => Ok(None),
        }
    }

    /// Picks the reference face from the configured frame, once per run.
    fn tracked_reference(
        &self,
        ctx: &ProcessorContext<'_>,
        analyser: &dyn FaceAnalyser,
        frames: &FrameSequence,
    ) -> Result<Option<DetectedFace>, ProcessorError> {
        ctx.reference.get_or_try_select(|| {
            let Some(path) = frames.reference_frame(ctx.config.reference_frame_number) else {
                return Ok(None);
            };
            let frame = load_frame(path)?;
            let face = get_one_face(analyser, &frame, ctx.config.reference_face_position)?;
            match &face {
                Some(face) => log::debug!(
                    "[{SCOPE}] Reference face at ({:.0}, {:.0}) in {}",
                    face.bbox.x0,
                    face.bbox.y0,
                    path.display()
                ),
                None => log::warn!("[{SCOPE}] No face in reference frame {}", path.display()),
            }
            Ok(face)
        })
    }
}

impl FrameProcessor for FaceSwapperProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scope(&self) -> &'static str {
        SCOPE
    }

    fn pre_check(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError> {
        for capability in [Capability::FaceAnalyser, Capability::FaceSwapper] {
            ctx.models
                .check(capability)
                .map_err(|e| ProcessorError::precondition(SCOPE, e.to_string()))?;
        }
        Ok(())
    }

    fn pre_start(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError> {
        let reference_path = &ctx.config.reference_path;
        if !is_image(reference_path) {
            return Err(ProcessorError::precondition(
                SCOPE,
                "Select an image for reference path",
            ));
        }
        let analyser = ctx.models.face_analyser()?;
        self.source_face(analyser.as_ref(), reference_path)?;
        check_target(SCOPE, ctx.config)
    }

    fn process_image(
        &self,
        ctx: &ProcessorContext<'_>,
        reference_path: &Path,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), ProcessorError> {
        let analyser = ctx.models.face_analyser()?;
        let swapper = ctx.models.face_swapper()?;
        let source = self.source_face(analyser.as_ref(), reference_path)?;
        let target = read_frame(input_path, 0).map_err(|e| ProcessorError::ReadFrame {
            path: input_path.to_path_buf(),
            message: e.to_string(),
        })?;
        // Images pick their reference straight from the target.
        let reference = if ctx.config.many_faces {
            None
        } else {
            get_one_face(analyser.as_ref(), &target, ctx.config.reference_face_position)?
        };

        let result = self.process_frame(
            ctx,
            analyser.as_ref(),
            swapper.as_ref(),
            &source,
            reference.as_ref(),
            target,
        )?;
        finish_image(input_path, output_path, result)
    }

    fn process_video(
        &self,
        ctx: &ProcessorContext<'_>,
        reference_path: &Path,
        frames: &FrameSequence,
        progress: ProgressCallback<'_>,
    ) -> Result<(), ProcessorError> {
        let analyser = ctx.models.face_analyser()?;
        let swapper = ctx.models.face_swapper()?;
        let source = self.source_face(analyser.as_ref(), reference_path)?;
        let reference = if ctx.config.many_faces {
            None
        } else {
            self.tracked_reference(ctx, analyser.as_ref(), frames)?
        };

        let executor = FrameExecutor::new(ctx.config.execution_threads);
        executor.execute(
            SCOPE,
            &frames.to_paths(),
            ctx.cancelled,
            |path| {
                let frame = load_frame(path)?;
                let result = self.process_frame(
                    ctx,
                    analyser.as_ref(),
                    swapper.as_ref(),
                    &source,
                    reference.as_ref(),
                    frame,
                )?;
                match result {
                    Some(frame) => store_frame(path, &frame),
                    None => Ok(()),
                }
            },
            progress,
        )
    }

    fn post_process(&self, ctx: &ProcessorContext<'_>) {
        ctx.models.release(Capability::FaceSwapper);
        ctx.reference.clear();
    }
}
