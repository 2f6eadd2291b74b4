use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::ScopedJoinHandle;

use crate::processors::frame_processor::ProgressCallback;
use crate::processors::processor_error::ProcessorError;

/// Runs per-frame work over a worker pool.
///
/// Layout: `queue → N workers → progress`
///
/// Frame paths are queued up front; each worker pulls the next path until
/// the queue is drained, a worker fails, or the run is cancelled. Work
/// items are independent files, so completion order is unspecified.
pub struct FrameExecutor {
    threads: usize,
}

impl FrameExecutor {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn execute<F>(
        &self,
        scope: &'static str,
        paths: &[PathBuf],
        cancelled: &AtomicBool,
        work: F,
        progress: ProgressCallback<'_>,
    ) -> Result<(), ProcessorError>
    where
        F: Fn(&Path) -> Result<(), ProcessorError> + Sync,
    {
        let total = paths.len();
        let (path_tx, path_rx) = crossbeam_channel::unbounded::<&Path>();
        for path in paths {
            // The receiver is alive for the whole scope.
            let _ = path_tx.send(path.as_path());
        }
        drop(path_tx);

        let completed = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let workers = self.threads.min(total.max(1));

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let path_rx = path_rx.clone();
                    let work = &work;
                    let completed = &completed;
                    let failed = &failed;
                    s.spawn(move || -> Result<(), ProcessorError> {
                        for path in path_rx {
                            if cancelled.load(Ordering::Relaxed) || failed.load(Ordering::Relaxed) {
                                break;
                            }
                            if let Err(e) = work(path) {
                                failed.store(true, Ordering::Relaxed);
                                return Err(e);
                            }
                            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                            progress(done, total);
                        }
                        Ok(())
                    })
                })
                .collect();

            join_workers(scope, handles)
        })?;

        if cancelled.load(Ordering::Relaxed) {
            return Err(ProcessorError::Cancelled);
        }
        Ok(())
    }
}

/// Joins all workers and coalesces the first error encountered.
fn join_workers(
    scope: &'static str,
    handles: Vec<ScopedJoinHandle<'_, Result<(), ProcessorError>>>,
) -> Result<(), ProcessorError> {
    let mut first_error = None;
    for handle in handles {
        let result = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::WorkerPanicked(scope)),
        };
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
