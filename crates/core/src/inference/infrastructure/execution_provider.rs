use std::path::Path;

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    DirectMLExecutionProvider, ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

use crate::inference::domain::model_error::ModelError;

/// How inference sessions are built for this run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub execution_providers: Vec<String>,
    pub intra_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            execution_providers: vec!["cpu".to_string()],
            intra_threads: 1,
        }
    }
}

/// Maps configured provider names to ONNX Runtime dispatches.
///
/// Unknown names are skipped with a warning. CPU is always appended last
/// so a session can be built when an accelerator is unavailable.
pub fn execution_providers(names: &[String]) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    for name in names {
        match name.to_ascii_lowercase().as_str() {
            "cpu" => {}
            "cuda" => providers.push(CUDAExecutionProvider::default().build()),
            "tensorrt" => providers.push(TensorRTExecutionProvider::default().build()),
            "coreml" => providers.push(CoreMLExecutionProvider::default().build()),
            "directml" => providers.push(DirectMLExecutionProvider::default().build()),
            other => log::warn!("Ignoring unknown execution provider: {other}"),
        }
    }
    providers.push(CPUExecutionProvider::default().build());
    providers
}

/// True when `name` is one of the supported execution provider names.
pub fn is_known_provider(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "cpu" | "cuda" | "tensorrt" | "coreml" | "directml"
    )
}

/// Builds an inference session for `model_path` with the configured
/// providers and thread count.
pub fn build_session(
    model_name: &str,
    model_path: &Path,
    options: &SessionOptions,
) -> Result<Session, ModelError> {
    Session::builder()
        .map_err(|e| ModelError::load(model_name, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ModelError::load(model_name, e))?
        .with_intra_threads(options.intra_threads.max(1))
        .map_err(|e| ModelError::load(model_name, e))?
        .with_execution_providers(execution_providers(&options.execution_providers))
        .map_err(|e| ModelError::load(model_name, e))?
        .commit_from_file(model_path)
        .map_err(|e| ModelError::load(model_name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cpu_only_yields_single_fallback() {
        assert_eq!(execution_providers(&names(&["cpu"])).len(), 1);
    }

    #[test]
    fn test_accelerators_precede_cpu_fallback() {
        assert_eq!(execution_providers(&names(&["cuda", "tensorrt"])).len(), 3);
    }

    #[test]
    fn test_unknown_provider_is_skipped() {
        assert_eq!(execution_providers(&names(&["quantum"])).len(), 1);
    }

    #[rstest]
    #[case("cpu", true)]
    #[case("CUDA", true)]
    #[case("coreml", true)]
    #[case("rocm", false)]
    fn test_is_known_provider(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_known_provider(name), expected);
    }

    #[test]
    fn test_missing_model_file_is_load_error() {
        let result = build_session(
            "missing.onnx",
            Path::new("/nonexistent/missing.onnx"),
            &SessionOptions::default(),
        );
        assert!(matches!(result, Err(ModelError::Load { .. })));
    }
}
