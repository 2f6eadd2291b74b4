use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file {name} not found (searched: {})", display_paths(.searched))]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a model file by name. Weights are never downloaded.
///
/// Resolution order:
/// 1. Configured models directory
/// 2. User cache directory (platform-specific)
pub fn resolve(name: &str, models_dir: Option<&Path>) -> Result<PathBuf, ModelResolveError> {
    let mut searched = Vec::new();

    if let Some(dir) = models_dir {
        let configured = dir.join(name);
        if configured.is_file() {
            return Ok(configured);
        }
        searched.push(configured);
    }

    match model_cache_dir() {
        Ok(cache_dir) => {
            let cached = cache_dir.join(name);
            if cached.is_file() {
                return Ok(cached);
            }
            searched.push(cached);
        }
        Err(e) if searched.is_empty() => return Err(e),
        Err(_) => {}
    }

    Err(ModelResolveError::NotFound {
        name: name.to_string(),
        searched,
    })
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/faceswap/models/`
/// - Linux: `$XDG_CACHE_HOME/faceswap/models/` or `~/.cache/faceswap/models/`
/// - Windows: `%LOCALAPPDATA%/faceswap/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("faceswap").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("faceswap").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}
