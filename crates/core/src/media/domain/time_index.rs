/// Formats a position in seconds as `HH:MM:SS.cc` (hundredths truncated).
pub fn format_time_index(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    // Nudge past representation error so 0.29 * 100 stays 29.
    let total_centis = (seconds * 100.0 + 1e-6).floor() as u64;
    let centis = total_centis % 100;
    let total_secs = total_centis / 100;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}.{centis:02}")
}

/// Playback position of frame `frame_number` at `fps`.
pub fn frame_time_index(frame_number: u64, fps: f64) -> String {
    if fps <= 0.0 {
        return format_time_index(0.0);
    }
    format_time_index(frame_number as f64 / fps)
}
