use std::fmt;
use std::str::FromStr;

use crate::processors::face_enhancer_processor::{self, FaceEnhancerProcessor};
use crate::processors::face_swapper_processor::{self, FaceSwapperProcessor};
use crate::processors::frame_processor::FrameProcessor;
use crate::processors::processor_error::ProcessorError;

const CORE_SCOPE: &str = "FACESWAP.CORE";

/// Stages that can appear in `frame_processors`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorKind {
    FaceSwapper,
    FaceEnhancer,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 2] = [ProcessorKind::FaceSwapper, ProcessorKind::FaceEnhancer];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorKind::FaceSwapper => face_swapper_processor::NAME,
            ProcessorKind::FaceEnhancer => face_enhancer_processor::NAME,
        }
    }

    pub fn create(self) -> Box<dyn FrameProcessor> {
        match self {
            ProcessorKind::FaceSwapper => Box::new(FaceSwapperProcessor::new()),
            ProcessorKind::FaceEnhancer => Box::new(FaceEnhancerProcessor::new()),
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                ProcessorError::precondition(CORE_SCOPE, format!("Unknown frame processor: {s}"))
            })
    }
}

/// Builds the stages named in `names`, in the given order.
pub fn create_processors(names: &[String]) -> Result<Vec<Box<dyn FrameProcessor>>, ProcessorError> {
    names
        .iter()
        .map(|name| name.parse::<ProcessorKind>().map(ProcessorKind::create))
        .collect()
}
