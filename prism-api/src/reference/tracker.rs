use crate::{PrismError, PrismNativeHandle, PrismResult};
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// The kinds of native object the reference drivers hand out
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceObjectKind {
    Instance,
    Device,
    Buffer,
    Texture,
}

#[derive(Debug)]
struct ReferenceObject {
    kind: ReferenceObjectKind,
    owner: Option<PrismNativeHandle>,
    name: Option<String>,
    // Only buffers keep their contents
    size: u64,
    contents: Vec<u8>,
}

/// Hands out handles for reference driver objects and records which are still alive. Shared by
/// all natives of a `ReferenceDriver` so tests can check that every native object was released
/// exactly once.
#[derive(Debug)]
pub struct ReferenceObjectTracker {
    next_handle: AtomicU64,
    objects: Mutex<FnvHashMap<u64, ReferenceObject>>,
    invalid_releases: AtomicUsize,
}

impl Default for ReferenceObjectTracker {
    fn default() -> Self {
        ReferenceObjectTracker {
            // 0 is never a valid handle
            next_handle: AtomicU64::new(1),
            objects: Default::default(),
            invalid_releases: AtomicUsize::new(0),
        }
    }
}

impl ReferenceObjectTracker {
    pub(crate) fn create(
        &self,
        kind: ReferenceObjectKind,
        owner: Option<PrismNativeHandle>,
        size: u64,
    ) -> PrismNativeHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let contents = if kind == ReferenceObjectKind::Buffer {
            vec![0; size as usize]
        } else {
            Vec::default()
        };

        self.objects.lock().unwrap().insert(
            handle,
            ReferenceObject {
                kind,
                owner,
                name: None,
                size,
                contents,
            },
        );

        log::trace!("reference driver created {:?} {}", kind, handle);
        PrismNativeHandle(handle)
    }

    /// Returns false, and counts an invalid release, if the object was already released
    pub(crate) fn release(
        &self,
        handle: PrismNativeHandle,
    ) -> bool {
        match self.objects.lock().unwrap().remove(&handle.0) {
            Some(object) => {
                log::trace!("reference driver released {:?} {}", object.kind, handle.0);
                true
            }
            None => {
                log::error!(
                    "reference driver object {} released but it is not alive",
                    handle.0
                );
                self.invalid_releases.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub(crate) fn set_name(
        &self,
        handle: PrismNativeHandle,
        name: &str,
    ) {
        if let Some(object) = self.objects.lock().unwrap().get_mut(&handle.0) {
            object.name = Some(name.to_string());
        }
    }

    pub(crate) fn write(
        &self,
        handle: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&handle.0)
            .ok_or_else(|| PrismError::StringError(format!("unknown object {}", handle.0)))?;

        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= object.size)
            .ok_or_else(|| {
                PrismError::invalid_argument(
                    "offset",
                    format!(
                        "writing {} bytes at offset {} overruns a {} byte object",
                        data.len(),
                        offset,
                        object.size
                    ),
                )
            })?;

        object.contents[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    pub fn is_alive(
        &self,
        handle: PrismNativeHandle,
    ) -> bool {
        self.objects.lock().unwrap().contains_key(&handle.0)
    }

    pub fn live_count(
        &self,
        kind: ReferenceObjectKind,
    ) -> usize {
        self.objects
            .lock()
            .unwrap()
            .values()
            .filter(|object| object.kind == kind)
            .count()
    }

    /// Number of live objects created by the given device or instance
    pub fn live_children(
        &self,
        owner: PrismNativeHandle,
    ) -> usize {
        self.objects
            .lock()
            .unwrap()
            .values()
            .filter(|object| object.owner == Some(owner))
            .count()
    }

    pub fn object_name(
        &self,
        handle: PrismNativeHandle,
    ) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&handle.0)
            .and_then(|object| object.name.clone())
    }

    pub fn object_contents(
        &self,
        handle: PrismNativeHandle,
    ) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&handle.0)
            .map(|object| object.contents.clone())
    }

    /// Releases of objects that were not alive. Nonzero means something was released twice.
    pub fn invalid_release_count(&self) -> usize {
        self.invalid_releases.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_exactly_once() {
        let tracker = ReferenceObjectTracker::default();
        let device = tracker.create(ReferenceObjectKind::Device, None, 0);
        let buffer = tracker.create(ReferenceObjectKind::Buffer, Some(device), 16);
        assert_ne!(device, buffer);
        assert_eq!(tracker.live_children(device), 1);

        assert!(tracker.release(buffer));
        assert!(!tracker.release(buffer));
        assert_eq!(tracker.invalid_release_count(), 1);
        assert_eq!(tracker.live_count(ReferenceObjectKind::Buffer), 0);
        assert!(tracker.is_alive(device));
    }

    #[test]
    fn test_buffer_writes_are_bounds_checked() {
        let tracker = ReferenceObjectTracker::default();
        let buffer = tracker.create(ReferenceObjectKind::Buffer, None, 4);
        tracker.write(buffer, 1, &[7, 8]).unwrap();
        assert_eq!(tracker.object_contents(buffer).unwrap(), vec![0, 7, 8, 0]);

        let error = tracker.write(buffer, 3, &[1, 2]).unwrap_err();
        assert_eq!(error.invalid_field(), Some("offset"));
    }
}
