use std::collections::VecDeque;
use std::time::Instant;

/// Cross-cutting logger for run orchestration events.
///
/// Decouples the orchestrator from specific output mechanisms so callers
/// can observe a run without changing the orchestration code.
pub trait RunLogger: Send {
    /// Report a `[SCOPE] message` status line.
    fn status(&mut self, scope: &str, message: &str);

    /// Report frame-level progress of the current stage.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullRunLogger;

impl RunLogger for NullRunLogger {
    fn status(&mut self, _scope: &str, _message: &str) {}
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
}

/// CLI logger for a run: status lines, progress at fixed percentage steps
/// and a per-stage timing table at the end.
///
/// Stages run one after another over the whole frame sequence, so timings
/// are kept in the order they were recorded. Progress counts may arrive
/// out of order from parallel workers; only the highest count is reported.
pub struct StdoutRunLogger {
    step_percent: usize,
    next_percent: usize,
    completed: usize,
    frames: usize,
    stages: Vec<(String, f64)>,
    started: Instant,
    recent_status: VecDeque<String>,
}

/// Status lines retained for inspection.
const STATUS_HISTORY: usize = 16;

impl StdoutRunLogger {
    /// `step_percent` is clamped to 1..=100.
    pub fn new(step_percent: usize) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            next_percent: 0,
            completed: 0,
            frames: 0,
            stages: Vec::new(),
            started: Instant::now(),
            recent_status: VecDeque::with_capacity(STATUS_HISTORY),
        }
    }

    /// The last few status lines, oldest first.
    pub fn recent_status(&self) -> impl Iterator<Item = &str> {
        self.recent_status.iter().map(String::as_str)
    }

    fn restart_progress(&mut self, total: usize) {
        self.frames = total;
        self.completed = 0;
        self.next_percent = 0;
    }

    /// Recorded `(stage, duration_ms)` pairs in run order.
    pub fn stages(&self) -> &[(String, f64)] {
        &self.stages
    }

    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        let mut out = format!(
            "Finished in {:.1}s, {} frames",
            self.started.elapsed().as_secs_f64(),
            self.frames
        );
        for (stage, ms) in &self.stages {
            let secs = ms / 1000.0;
            out.push_str(&format!("\n  {stage:<14} {secs:>8.2}s"));
            if self.frames > 0 && secs > 0.0 {
                out.push_str(&format!("  {:>7.1} frames/s", self.frames as f64 / secs));
            }
        }
        Some(out)
    }
}

impl Default for StdoutRunLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RunLogger for StdoutRunLogger {
    fn status(&mut self, scope: &str, message: &str) {
        let line = format!("[{scope}] {message}");
        log::info!("{line}");
        if self.recent_status.len() == STATUS_HISTORY {
            self.recent_status.pop_front();
        }
        self.recent_status.push_back(line);
    }

    fn progress(&mut self, current: usize, total: usize) {
        if total == 0 {
            return;
        }
        if total != self.frames {
            self.restart_progress(total);
        }
        let current = current.min(total);
        if current <= self.completed {
            return;
        }
        self.completed = current;
        let percent = current * 100 / total;
        if percent >= self.next_percent || current == total {
            log::info!("{current}/{total} frames ({percent}%)");
            self.next_percent = (percent / self.step_percent + 1) * self.step_percent;
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        log::debug!("{stage} took {duration_ms:.0}ms");
        self.stages.push((stage.to_string(), duration_ms));
        // The next stage counts the same frames from zero.
        self.restart_progress(self.frames);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullRunLogger;
        logger.status("FACESWAP.CORE", "hello");
        logger.progress(1, 10);
        logger.timing("face_swapper", 5.0);
        logger.summary();
    }

    #[test]
    fn test_status_formats_scope() {
        let mut logger = StdoutRunLogger::default();
        logger.status("FACESWAP.CORE", "Extracting frames with 30 FPS...");
        assert_eq!(
            logger.recent_status().collect::<Vec<_>>(),
            ["[FACESWAP.CORE] Extracting frames with 30 FPS..."]
        );
    }

    #[test]
    fn test_status_history_is_bounded() {
        let mut logger = StdoutRunLogger::default();
        for i in 0..100 {
            logger.status("FACESWAP.CORE", &format!("line {i}"));
        }
        let lines: Vec<_> = logger.recent_status().collect();
        assert_eq!(lines.len(), STATUS_HISTORY);
        assert_eq!(lines[0], "[FACESWAP.CORE] line 84");
        assert_eq!(lines[STATUS_HISTORY - 1], "[FACESWAP.CORE] line 99");
    }

    #[test]
    fn test_stages_keep_run_order() {
        let mut logger = StdoutRunLogger::default();
        logger.timing("extract", 20.0);
        logger.timing("face_swapper", 30.0);
        logger.timing("encode", 5.0);

        let names: Vec<_> = logger.stages().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, ["extract", "face_swapper", "encode"]);
    }

    #[test]
    fn test_summary_lists_stages_with_throughput() {
        let mut logger = StdoutRunLogger::default();
        logger.progress(10, 10);
        logger.timing("face_enhancer", 2000.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Finished in"));
        assert!(summary.contains("10 frames"));
        assert!(summary.contains("face_enhancer"));
        assert!(summary.contains("5.0 frames/s"));
    }

    #[test]
    fn test_no_stages_no_summary() {
        assert!(StdoutRunLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_progress_steps_reset_per_stage() {
        let mut logger = StdoutRunLogger::new(25);
        for i in 1..=8 {
            logger.progress(i, 8);
        }
        assert_eq!(logger.next_percent, 125);

        logger.timing("face_swapper", 10.0);
        logger.progress(1, 8);
        assert_eq!(logger.next_percent, 25);
        assert_eq!(logger.completed, 1);
        assert_eq!(logger.frames, 8);
    }

    #[test]
    fn test_out_of_order_ticks_do_not_reset_progress() {
        let mut logger = StdoutRunLogger::new(25);
        logger.progress(3, 8);
        logger.progress(4, 8);
        let next = logger.next_percent;

        logger.progress(1, 8);
        logger.progress(2, 8);

        assert_eq!(logger.completed, 4);
        assert_eq!(logger.next_percent, next);
        assert_eq!(logger.frames, 8);
    }

    #[test]
    fn test_step_is_clamped() {
        assert_eq!(StdoutRunLogger::new(0).step_percent, 1);
        assert_eq!(StdoutRunLogger::new(500).step_percent, 100);
    }
}
