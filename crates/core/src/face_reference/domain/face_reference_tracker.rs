use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::shared::face::DetectedFace;

/// Run-scoped slot for the face whose identity is tracked across a video.
///
/// Unset at the start of a run, written once when the reference frame is
/// analysed, cleared when a processor finishes.
#[derive(Default)]
pub struct FaceReferenceTracker {
    slot: Mutex<Option<DetectedFace>>,
}

impl FaceReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<DetectedFace> {
        self.lock().clone()
    }

    pub fn set(&self, face: DetectedFace) {
        *self.lock() = Some(face);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Returns the stored reference, running `select` to choose one only if
    /// the slot is empty. The lock is held across `select`, so concurrent
    /// callers never select twice.
    ///
    /// A `None` selection leaves the slot empty.
    pub fn get_or_try_select<E, F>(&self, select: F) -> Result<Option<DetectedFace>, E>
    where
        F: FnOnce() -> Result<Option<DetectedFace>, E>,
    {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = select()?;
        }
        Ok(slot.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<DetectedFace>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::face::test_support::face_at;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_empty() {
        let tracker = FaceReferenceTracker::new();
        assert!(tracker.get().is_none());
        assert!(!tracker.is_set());
    }

    #[test]
    fn test_set_then_get() {
        let tracker = FaceReferenceTracker::new();
        tracker.set(face_at(12.0, 0.4));
        assert_eq!(tracker.get().unwrap().bbox.x0, 12.0);
    }

    #[test]
    fn test_clear_resets_slot() {
        let tracker = FaceReferenceTracker::new();
        tracker.set(face_at(12.0, 0.4));
        tracker.clear();
        assert!(tracker.get().is_none());
    }

    #[test]
    fn test_select_runs_only_when_empty() {
        let tracker = FaceReferenceTracker::new();
        let first: Result<_, ()> = tracker.get_or_try_select(|| Ok(Some(face_at(1.0, 0.0))));
        let second: Result<_, ()> = tracker.get_or_try_select(|| Ok(Some(face_at(2.0, 0.0))));
        assert_eq!(first.unwrap().unwrap().bbox.x0, 1.0);
        assert_eq!(second.unwrap().unwrap().bbox.x0, 1.0);
    }

    #[test]
    fn test_failed_select_leaves_slot_empty() {
        let tracker = FaceReferenceTracker::new();
        let result = tracker.get_or_try_select(|| Err("detector failed"));
        assert!(result.is_err());
        assert!(!tracker.is_set());
    }

    #[test]
    fn test_empty_select_can_be_retried() {
        let tracker = FaceReferenceTracker::new();
        let none: Result<_, ()> = tracker.get_or_try_select(|| Ok(None));
        assert!(none.unwrap().is_none());
        let some: Result<_, ()> = tracker.get_or_try_select(|| Ok(Some(face_at(5.0, 0.0))));
        assert!(some.unwrap().is_some());
    }

    #[test]
    fn test_concurrent_select_happens_once() {
        let tracker = Arc::new(FaceReferenceTracker::new());
        let selections = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                let selections = selections.clone();
                thread::spawn(move || {
                    let face: Result<_, ()> = tracker.get_or_try_select(|| {
                        selections.fetch_add(1, Ordering::SeqCst);
                        Ok(Some(face_at(i as f32, 0.0)))
                    });
                    face.unwrap().unwrap().bbox.x0
                })
            })
            .collect();
        let seen: Vec<f32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(selections.load(Ordering::SeqCst), 1);
        assert!(seen.iter().all(|x| *x == seen[0]));
    }
}
