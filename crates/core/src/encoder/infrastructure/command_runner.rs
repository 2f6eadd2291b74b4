use std::process::Command;
use std::time::Instant;

use crate::encoder::domain::encoder_error::EncoderError;

/// Runs an external program to completion and returns its stdout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<String, EncoderError>;
}

/// Spawns real processes via `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, EncoderError> {
        log::debug!("[FFMPEG] {program} {}", args.join(" "));
        let start = Instant::now();

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| EncoderError::Spawn {
                program: program.to_string(),
                source,
            })?;

        log::debug!(
            "[FFMPEG] {program} finished in {:.1}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        if !output.status.success() {
            return Err(EncoderError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
