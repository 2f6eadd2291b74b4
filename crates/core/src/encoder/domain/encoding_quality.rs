//! User-facing 0-100 quality knobs mapped onto ffmpeg scales.

/// Maps frame quality (0 best, 100 worst) to the `-q:v` scale 0-31.
pub fn frame_quality_scale(quality: u8) -> u32 {
    quality.min(100) as u32 * 31 / 100
}

/// Maps video lossiness (0-100) to a constant rate factor 0-51.
pub fn constant_rate_factor(lossiness: u8) -> u32 {
    (lossiness.min(100) as u32 + 1) * 51 / 100
}

/// Parses `ffprobe` frame rate output: `num/den` or a plain decimal.
pub fn parse_frame_rate(output: &str) -> Option<f64> {
    let text = output.lines().next()?.trim();
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
