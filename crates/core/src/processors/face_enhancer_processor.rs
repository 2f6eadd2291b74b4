use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::face_reference::domain::face_matcher::get_many_faces;
use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::model_provider::Capability;
use crate::media::domain::frame_sequence::FrameSequence;
use crate::processors::frame_processor::{
    check_target, finish_image, load_frame, store_frame, FrameProcessor, ProcessorContext,
    ProgressCallback,
};
use crate::processors::infrastructure::frame_executor::FrameExecutor;
use crate::processors::processor_error::ProcessorError;
use crate::shared::constants::ENHANCER_PADDING_RATIO;
use crate::shared::frame::Frame;

pub const NAME: &str = "face_enhancer";
pub const SCOPE: &str = "FACESWAP.FACE-ENHANCER";

/// Restores every detected face in place.
///
/// Workers read, detect and write frames in parallel, but only one
/// restoration call runs at a time.
#[derive(Default)]
pub struct FaceEnhancerProcessor {
    gate: Mutex<()>,
}

impl FaceEnhancerProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the enhanced frame, or `None` when it has no faces.
    fn process_frame(
        &self,
        analyser: &dyn FaceAnalyser,
        enhancer: &dyn FaceEnhancer,
        mut frame: Frame,
    ) -> Result<Option<Frame>, ProcessorError> {
        let faces = get_many_faces(analyser, &frame)?;
        if faces.is_empty() {
            return Ok(None);
        }
        for face in &faces {
            let Some((x0, y0, x1, y1)) =
                face.bbox
                    .padded_pixel_rect(ENHANCER_PADDING_RATIO, frame.width(), frame.height())
            else {
                continue;
            };
            let crop = frame.crop(x0, y0, x1, y1);
            if crop.is_empty() {
                continue;
            }
            let restored = {
                let _permit = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
                enhancer.enhance(&crop)?
            };
            frame.paste(&restored, x0, y0);
        }
        Ok(Some(frame))
    }
}

impl FrameProcessor for FaceEnhancerProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scope(&self) -> &'static str {
        SCOPE
    }

    fn pre_check(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError> {
        for capability in [Capability::FaceAnalyser, Capability::FaceEnhancer] {
            ctx.models
                .check(capability)
                .map_err(|e| ProcessorError::precondition(SCOPE, e.to_string()))?;
        }
        Ok(())
    }

    fn pre_start(&self, ctx: &ProcessorContext<'_>) -> Result<(), ProcessorError> {
        check_target(SCOPE, ctx.config)
    }

    fn process_image(
        &self,
        ctx: &ProcessorContext<'_>,
        _reference_path: &Path,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), ProcessorError> {
        let analyser = ctx.models.face_analyser()?;
        let enhancer = ctx.models.face_enhancer()?;
        let frame = load_frame(input_path)?;
        let result = self.process_frame(analyser.as_ref(), enhancer.as_ref(), frame)?;
        finish_image(input_path, output_path, result)
    }

    fn process_video(
        &self,
        ctx: &ProcessorContext<'_>,
        _reference_path: &Path,
        frames: &FrameSequence,
        progress: ProgressCallback<'_>,
    ) -> Result<(), ProcessorError> {
        let analyser = ctx.models.face_analyser()?;
        let enhancer = ctx.models.face_enhancer()?;

        FrameExecutor::new(ctx.config.execution_threads).execute(
            SCOPE,
            &frames.to_paths(),
            ctx.cancelled,
            |path| {
                let frame = load_frame(path)?;
                match self.process_frame(analyser.as_ref(), enhancer.as_ref(), frame)? {
                    Some(frame) => store_frame(path, &frame),
                    None => Ok(()),
                }
            },
            progress,
        )
    }

    fn post_process(&self, ctx: &ProcessorContext<'_>) {
        ctx.models.release(Capability::FaceEnhancer);
    }
}
