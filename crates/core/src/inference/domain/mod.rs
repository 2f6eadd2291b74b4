pub mod content_classifier;
pub mod face_analyser;
pub mod face_enhancer;
pub mod face_swapper;
pub mod model_error;
pub mod model_provider;
