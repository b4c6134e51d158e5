use crate::PrismBackendType;
use std::sync::Arc;

#[cfg(all(debug_assertions, feature = "track-device-contexts"))]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(all(debug_assertions, feature = "track-device-contexts"))]
use std::sync::Mutex;

/// Records where device context clones were created so that clones that keep a device alive past
/// `destroy()` can be found. Only active with the `track-device-contexts` feature in debug builds.
#[derive(Default)]
pub(crate) struct PrismContextTracker {
    #[cfg(all(debug_assertions, feature = "track-device-contexts"))]
    next_create_index: AtomicU64,

    #[cfg(all(debug_assertions, feature = "track-device-contexts"))]
    all_contexts: Mutex<fnv::FnvHashMap<u64, backtrace::Backtrace>>,
}

impl PrismContextTracker {
    pub fn track_new(&self) -> u64 {
        #[cfg(all(debug_assertions, feature = "track-device-contexts"))]
        let create_index = {
            let create_index = self.next_create_index.fetch_add(1, Ordering::Relaxed);
            let create_backtrace = backtrace::Backtrace::new_unresolved();
            self.all_contexts
                .lock()
                .unwrap()
                .insert(create_index, create_backtrace);
            log::trace!("Cloned device context create_index {}", create_index);
            create_index
        };

        #[cfg(not(all(debug_assertions, feature = "track-device-contexts")))]
        let create_index = 0;

        create_index
    }

    pub fn untrack(
        &self,
        _create_index: u64,
    ) {
        #[cfg(all(debug_assertions, feature = "track-device-contexts"))]
        {
            self.all_contexts.lock().unwrap().remove(&_create_index);
        }
    }

    pub fn log_outstanding(&self) {
        #[cfg(all(debug_assertions, feature = "track-device-contexts"))]
        {
            let mut all_contexts = self.all_contexts.lock().unwrap();
            for (k, v) in all_contexts.iter_mut() {
                v.resolve();
                log::warn!("context allocation: {}\n{:?}", k, v);
            }
        }
    }
}

/// Implemented by the shared state behind each backend's device context
pub(crate) trait TrackedDeviceInner {
    fn context_tracker(&self) -> &PrismContextTracker;
}

/// Drops what should be the last reference to a device. If other references are still alive, the
/// native device is released when the last of them is dropped and a diagnostic is logged.
pub(crate) fn release_device_inner<T: TrackedDeviceInner>(
    inner: Arc<T>,
    backend: PrismBackendType,
) {
    let strong_count = Arc::strong_count(&inner);
    match Arc::try_unwrap(inner) {
        Ok(inner) => std::mem::drop(inner),
        Err(_arc) => {
            #[cfg(debug_assertions)]
            {
                log::warn!(
                    "Could not destroy {:?} device, {} references to it exist. It will be released when they are dropped",
                    backend,
                    strong_count - 1
                );
                _arc.context_tracker().log_outstanding();
            }
            #[cfg(not(debug_assertions))]
            let _ = (backend, strong_count);
        }
    }
}
