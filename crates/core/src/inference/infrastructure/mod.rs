pub mod alignment;
pub mod execution_provider;
pub mod onnx_face_analyser;
pub mod onnx_face_enhancer;
pub mod onnx_face_swapper;
pub mod onnx_model_factory;
pub mod onnx_nsfw_classifier;
