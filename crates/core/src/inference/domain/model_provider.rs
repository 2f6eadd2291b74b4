use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::inference::domain::content_classifier::ContentClassifier;
use crate::inference::domain::face_analyser::FaceAnalyser;
use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::face_swapper::FaceSwapper;
use crate::inference::domain::model_error::ModelError;

/// Inference capability backed by one lazily loaded model handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    FaceAnalyser,
    FaceSwapper,
    FaceEnhancer,
    ContentClassifier,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::FaceAnalyser => "face analyser",
            Capability::FaceSwapper => "face swapper",
            Capability::FaceEnhancer => "face enhancer",
            Capability::ContentClassifier => "content classifier",
        };
        f.write_str(name)
    }
}

/// Constructs concrete model handles. Called at most once per capability
/// between releases.
pub trait ModelFactory: Send + Sync {
    /// Checks that the weights for `capability` are available without
    /// loading them.
    fn check(&self, capability: Capability) -> Result<(), ModelError>;

    fn face_analyser(&self) -> Result<Arc<dyn FaceAnalyser>, ModelError>;
    fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ModelError>;
    fn face_enhancer(&self) -> Result<Arc<dyn FaceEnhancer>, ModelError>;
    fn content_classifier(&self) -> Result<Arc<dyn ContentClassifier>, ModelError>;
}

/// One-time-initialised, clearable handle.
///
/// Readers of a loaded handle only take the shared lock; construction
/// happens under the exclusive lock so concurrent first callers build once.
pub struct ModelSlot<T: ?Sized> {
    handle: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> Default for ModelSlot<T> {
    fn default() -> Self {
        Self {
            handle: RwLock::new(None),
        }
    }
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>, ModelError>
    where
        F: FnOnce() -> Result<Arc<T>, ModelError>,
    {
        {
            let guard = self.handle.read().map_err(|_| ModelError::Poisoned)?;
            if let Some(handle) = guard.as_ref() {
                return Ok(Arc::clone(handle));
            }
        }

        let mut guard = self.handle.write().map_err(|_| ModelError::Poisoned)?;
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = init()?;
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Drops the slot's reference. In-flight users keep theirs until done.
    pub fn clear(&self) {
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.handle
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

/// Process-wide access to every inference capability.
///
/// Owned by the orchestrator and passed by reference to processors; each
/// capability is constructed on first acquire and dropped on release.
pub struct ModelProvider {
    factory: Box<dyn ModelFactory>,
    analyser: ModelSlot<dyn FaceAnalyser>,
    swapper: ModelSlot<dyn FaceSwapper>,
    enhancer: ModelSlot<dyn FaceEnhancer>,
    classifier: ModelSlot<dyn ContentClassifier>,
}

impl ModelProvider {
    pub fn new(factory: Box<dyn ModelFactory>) -> Self {
        Self {
            factory,
            analyser: ModelSlot::default(),
            swapper: ModelSlot::default(),
            enhancer: ModelSlot::default(),
            classifier: ModelSlot::default(),
        }
    }

    pub fn check(&self, capability: Capability) -> Result<(), ModelError> {
        self.factory.check(capability)
    }

    pub fn face_analyser(&self) -> Result<Arc<dyn FaceAnalyser>, ModelError> {
        self.analyser.get_or_try_init(|| {
            log::debug!("Loading {}", Capability::FaceAnalyser);
            self.factory.face_analyser()
        })
    }

    pub fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ModelError> {
        self.swapper.get_or_try_init(|| {
            log::debug!("Loading {}", Capability::FaceSwapper);
            self.factory.face_swapper()
        })
    }

    pub fn face_enhancer(&self) -> Result<Arc<dyn FaceEnhancer>, ModelError> {
        self.enhancer.get_or_try_init(|| {
            log::debug!("Loading {}", Capability::FaceEnhancer);
            self.factory.face_enhancer()
        })
    }

    pub fn content_classifier(&self) -> Result<Arc<dyn ContentClassifier>, ModelError> {
        self.classifier.get_or_try_init(|| {
            log::debug!("Loading {}", Capability::ContentClassifier);
            self.factory.content_classifier()
        })
    }

    pub fn release(&self, capability: Capability) {
        if self.is_loaded(capability) {
            log::debug!("Releasing {capability}");
        }
        match capability {
            Capability::FaceAnalyser => self.analyser.clear(),
            Capability::FaceSwapper => self.swapper.clear(),
            Capability::FaceEnhancer => self.enhancer.clear(),
            Capability::ContentClassifier => self.classifier.clear(),
        }
    }

    pub fn release_all(&self) {
        for capability in [
            Capability::FaceAnalyser,
            Capability::FaceSwapper,
            Capability::FaceEnhancer,
            Capability::ContentClassifier,
        ] {
            self.release(capability);
        }
    }

    pub fn is_loaded(&self, capability: Capability) -> bool {
        match capability {
            Capability::FaceAnalyser => self.analyser.is_loaded(),
            Capability::FaceSwapper => self.swapper.is_loaded(),
            Capability::FaceEnhancer => self.enhancer.is_loaded(),
            Capability::ContentClassifier => self.classifier.is_loaded(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::shared::face::DetectedFace;
    use crate::shared::frame::Frame;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Analyser returning a fixed face list per frame index; unknown
    /// indices fall back to `default`.
    #[derive(Default)]
    pub struct StubAnalyser {
        pub faces_by_index: HashMap<usize, Vec<DetectedFace>>,
        pub default: Vec<DetectedFace>,
        pub calls: AtomicUsize,
    }

    impl FaceAnalyser for StubAnalyser {
        fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .faces_by_index
                .get(&frame.index())
                .cloned()
                .unwrap_or_else(|| self.default.clone()))
        }
    }

    /// Swapper that paints the target box white and records each call as
    /// `(source_x0, target_x0)`.
    #[derive(Default)]
    pub struct StubSwapper {
        pub calls: Mutex<Vec<(f32, f32)>>,
    }

    impl FaceSwapper for StubSwapper {
        fn swap(
            &self,
            source: &DetectedFace,
            target: &DetectedFace,
            frame: &Frame,
        ) -> Result<Frame, ModelError> {
            self.calls
                .lock()
                .unwrap()
                .push((source.bbox.x0, target.bbox.x0));
            let mut out = frame.clone();
            let b = target.bbox;
            let (x0, y0) = (b.x0.max(0.0) as u32, b.y0.max(0.0) as u32);
            let patch_w = (b.x1 as u32).min(frame.width()).saturating_sub(x0);
            let patch_h = (b.y1 as u32).min(frame.height()).saturating_sub(y0);
            let patch = Frame::new(
                vec![255; (patch_w * patch_h * 3) as usize],
                patch_w,
                patch_h,
                3,
                frame.index(),
            );
            out.paste(&patch, x0, y0);
            Ok(out)
        }
    }

    /// Enhancer that inverts the crop and counts calls.
    #[derive(Default)]
    pub struct StubEnhancer {
        pub calls: AtomicUsize,
    }

    impl FaceEnhancer for StubEnhancer {
        fn enhance(&self, crop: &Frame) -> Result<Frame, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = crop.data().iter().map(|v| 255 - v).collect();
            Ok(Frame::new(
                data,
                crop.width(),
                crop.height(),
                crop.channels(),
                crop.index(),
            ))
        }
    }

    pub struct StubClassifier {
        pub restricted: bool,
    }

    impl ContentClassifier for StubClassifier {
        fn classify(&self, _path: &Path) -> Result<bool, ModelError> {
            Ok(self.restricted)
        }
    }

    /// Factory handing out shared stubs and counting constructions.
    pub struct StubFactory {
        pub analyser: Arc<StubAnalyser>,
        pub swapper: Arc<StubSwapper>,
        pub enhancer: Arc<StubEnhancer>,
        pub restricted: bool,
        pub missing: Vec<Capability>,
        pub constructions: Arc<Mutex<Vec<Capability>>>,
    }

    impl StubFactory {
        pub fn new(analyser: StubAnalyser) -> Self {
            Self {
                analyser: Arc::new(analyser),
                swapper: Arc::new(StubSwapper::default()),
                enhancer: Arc::new(StubEnhancer::default()),
                restricted: false,
                missing: Vec::new(),
                constructions: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn record(&self, capability: Capability) -> Result<(), ModelError> {
            self.check(capability)?;
            self.constructions.lock().unwrap().push(capability);
            Ok(())
        }
    }

    impl ModelFactory for StubFactory {
        fn check(&self, capability: Capability) -> Result<(), ModelError> {
            if self.missing.contains(&capability) {
                return Err(ModelError::load(&capability.to_string(), "weights not found"));
            }
            Ok(())
        }

        fn face_analyser(&self) -> Result<Arc<dyn FaceAnalyser>, ModelError> {
            self.record(Capability::FaceAnalyser)?;
            Ok(self.analyser.clone())
        }

        fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ModelError> {
            self.record(Capability::FaceSwapper)?;
            Ok(self.swapper.clone())
        }

        fn face_enhancer(&self) -> Result<Arc<dyn FaceEnhancer>, ModelError> {
            self.record(Capability::FaceEnhancer)?;
            Ok(self.enhancer.clone())
        }

        fn content_classifier(&self) -> Result<Arc<dyn ContentClassifier>, ModelError> {
            self.record(Capability::ContentClassifier)?;
            Ok(Arc::new(StubClassifier {
                restricted: self.restricted,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{StubAnalyser, StubFactory};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn provider() -> (ModelProvider, Arc<std::sync::Mutex<Vec<Capability>>>) {
        let factory = StubFactory::new(StubAnalyser::default());
        let constructions = factory.constructions.clone();
        (ModelProvider::new(Box::new(factory)), constructions)
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (provider, constructions) = provider();
        let a = provider.face_analyser().unwrap();
        let b = provider.face_analyser().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(constructions.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_first_acquire_constructs_once() {
        let (provider, constructions) = provider();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| provider.face_swapper().unwrap());
            }
        });
        assert_eq!(*constructions.lock().unwrap(), vec![Capability::FaceSwapper]);
    }

    #[test]
    fn test_release_forces_reconstruction() {
        let (provider, constructions) = provider();
        provider.face_enhancer().unwrap();
        assert!(provider.is_loaded(Capability::FaceEnhancer));

        provider.release(Capability::FaceEnhancer);
        assert!(!provider.is_loaded(Capability::FaceEnhancer));

        provider.face_enhancer().unwrap();
        assert_eq!(constructions.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_release_only_touches_one_capability() {
        let (provider, _) = provider();
        provider.face_analyser().unwrap();
        provider.face_swapper().unwrap();

        provider.release(Capability::FaceSwapper);
        assert!(provider.is_loaded(Capability::FaceAnalyser));
        assert!(!provider.is_loaded(Capability::FaceSwapper));

        provider.release_all();
        assert!(!provider.is_loaded(Capability::FaceAnalyser));
    }

    #[test]
    fn test_construction_error_leaves_slot_empty() {
        let mut factory = StubFactory::new(StubAnalyser::default());
        factory.missing.push(Capability::FaceSwapper);
        let provider = ModelProvider::new(Box::new(factory));

        assert!(provider.face_swapper().is_err());
        assert!(!provider.is_loaded(Capability::FaceSwapper));
        assert!(provider.check(Capability::FaceSwapper).is_err());
        assert!(provider.check(Capability::FaceAnalyser).is_ok());
    }

    #[test]
    fn test_slot_init_runs_once_under_contention() {
        let slot: ModelSlot<usize> = ModelSlot::default();
        let inits = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    slot.get_or_try_init(|| {
                        inits.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(42))
                    })
                    .unwrap()
                });
            }
        });
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }
}
