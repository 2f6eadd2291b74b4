use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::inference::domain::content_classifier::ContentClassifier;
use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::face_swapper::FaceSwapper;
use crate::inference::domain::model_error::ModelError;
use crate::inference::domain::model_provider::{Capability, ModelFactory};
use crate::inference::infrastructure::execution_provider::SessionOptions;
use crate::inference::infrastructure::onnx_face_analyser::OnnxFaceAnalyser;
use crate::inference::infrastructure::onnx_face_enhancer::OnnxFaceEnhancer;
use crate::inference::infrastructure::onnx_face_swapper::OnnxFaceSwapper;
use crate::inference::infrastructure::onnx_nsfw_classifier::OnnxNsfwClassifier;
use crate::shared::constants::{
    FACE_DETECTOR_MODEL_NAME, FACE_EMBEDDER_MODEL_NAME, FACE_ENHANCER_MODEL_NAME,
    FACE_SWAPPER_MODEL_NAME, NSFW_MODEL_NAME,
};
use crate::shared::model_resolver;

/// Builds ONNX-backed model handles from weights on disk.
pub struct OnnxModelFactory {
    models_dir: Option<PathBuf>,
    options: SessionOptions,
}

impl OnnxModelFactory {
    pub fn new(models_dir: Option<PathBuf>, options: SessionOptions) -> Self {
        Self {
            models_dir,
            options,
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, ModelError> {
        Ok(model_resolver::resolve(name, self.models_dir.as_deref())?)
    }
}

/// Weight files each capability needs.
pub fn required_models(capability: Capability) -> &'static [&'static str] {
    match capability {
        Capability::FaceAnalyser => &[FACE_DETECTOR_MODEL_NAME, FACE_EMBEDDER_MODEL_NAME],
        Capability::FaceSwapper => &[FACE_SWAPPER_MODEL_NAME],
        Capability::FaceEnhancer => &[FACE_ENHANCER_MODEL_NAME],
        Capability::ContentClassifier => &[NSFW_MODEL_NAME],
    }
}

impl ModelFactory for OnnxModelFactory {
    fn check(&self, capability: Capability) -> Result<(), ModelError> {
        for name in required_models(capability) {
            self.resolve(name)?;
        }
        Ok(())
    }

    fn face_analyser(&self) -> Result<Arc<dyn FaceAnalyser>, ModelError> {
        let detector = self.resolve(FACE_DETECTOR_MODEL_NAME)?;
        let embedder = self.resolve(FACE_EMBEDDER_MODEL_NAME)?;
        log::info!("Loading face analyser from {}", parent_display(&detector));
        Ok(Arc::new(OnnxFaceAnalyser::new(&detector, &embedder, &self.options)?))
    }

    fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ModelError> {
        let path = self.resolve(FACE_SWAPPER_MODEL_NAME)?;
        log::info!("Loading face swapper from {}", path.display());
        Ok(Arc::new(OnnxFaceSwapper::new(&path, &self.options)?))
    }

    fn face_enhancer(&self) -> Result<Arc<dyn FaceEnhancer>, ModelError> {
        let path = self.resolve(FACE_ENHANCER_MODEL_NAME)?;
        log::info!("Loading face enhancer from {}", path.display());
        Ok(Arc::new(OnnxFaceEnhancer::new(&path, &self.options)?))
    }

    fn content_classifier(&self) -> Result<Arc<dyn ContentClassifier>, ModelError> {
        let path = self.resolve(NSFW_MODEL_NAME)?;
        log::info!("Loading content classifier from {}", path.display());
        Ok(Arc::new(OnnxNsfwClassifier::new(&path, &self.options)?))
    }
}

fn parent_display(path: &Path) -> String {
    path.parent().unwrap_or(path).display().to_string()
}
