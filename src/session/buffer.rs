use super::consumer::FrameView;
use crate::av::Geometry;
use crate::error::{Result, VdkError};

/// A single reusable block of pixel storage plus its published geometry.
///
/// Storage is allocated lazily on the first [`ensure_geometry`] call and only
/// reallocated when the geometry actually changes, so frames of a steady
/// stream are all published into the same allocation.
///
/// Invariant: while a geometry is published, the storage holds exactly
/// `width * height * channels` bytes.
///
/// [`ensure_geometry`]: FrameBuffer::ensure_geometry
#[derive(Debug, Default)]
pub struct FrameBuffer {
    storage: Vec<u8>,
    geometry: Option<Geometry>,
    allocations: u64,
}

impl FrameBuffer {
    /// An empty buffer without geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the storage match `geometry`.
    ///
    /// Returns `true` when storage was (re)allocated and `false` when the
    /// geometry was already published. On failure the buffer is left released
    /// and [`VdkError::Allocation`] is returned.
    pub fn ensure_geometry(&mut self, geometry: Geometry) -> Result<bool> {
        if self.geometry == Some(geometry) {
            return Ok(false);
        }

        self.release();

        let capacity = geometry.capacity().ok_or_else(|| {
            VdkError::Allocation(format!("{} overflows the address space", geometry))
        })?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|e| VdkError::Allocation(format!("{} bytes for {}: {}", capacity, geometry, e)))?;
        storage.resize(capacity, 0);

        self.storage = storage;
        self.geometry = Some(geometry);
        self.allocations += 1;
        Ok(true)
    }

    /// Copies exactly [`capacity`](FrameBuffer::capacity) bytes of `source`
    /// into the owned storage.
    ///
    /// The source usually lives in decoder scratch memory that is overwritten
    /// on the next decode step, hence the copy. A short source is rejected
    /// with [`VdkError::SizeMismatch`] and leaves the current contents intact.
    pub fn publish(&mut self, source: &[u8]) -> Result<()> {
        if self.geometry.is_none() {
            return Err(VdkError::GeometryNotSet);
        }
        let capacity = self.storage.len();
        if source.len() < capacity {
            return Err(VdkError::SizeMismatch {
                expected: capacity,
                actual: source.len(),
            });
        }
        self.storage.copy_from_slice(&source[..capacity]);
        Ok(())
    }

    /// Releases the storage and clears the geometry. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.storage = Vec::new();
        self.geometry = None;
    }

    /// The current storage. Its address stays the same until the geometry
    /// changes or the buffer is released.
    pub fn handle(&self) -> Result<&[u8]> {
        match self.geometry {
            Some(_) => Ok(&self.storage),
            None => Err(VdkError::GeometryNotSet),
        }
    }

    /// The current storage together with its geometry, as handed to consumers.
    pub fn view(&self) -> Result<FrameView<'_>> {
        let geometry = self.geometry.ok_or(VdkError::GeometryNotSet)?;
        Ok(FrameView::new(&self.storage, geometry))
    }

    /// Currently published geometry.
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    /// Size of the storage in bytes, 0 while released.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of storage allocations performed over the buffer's lifetime.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_geometry_sequence_allocates_twice() {
        let mut buffer = FrameBuffer::new();

        assert!(buffer.ensure_geometry(Geometry::rgb(640, 480)).unwrap());
        let first = buffer.handle().unwrap().as_ptr();

        assert!(!buffer.ensure_geometry(Geometry::rgb(640, 480)).unwrap());
        assert_eq!(buffer.handle().unwrap().as_ptr(), first);
        assert_eq!(buffer.allocations(), 1);

        assert!(buffer.ensure_geometry(Geometry::rgb(1280, 720)).unwrap());
        assert_eq!(buffer.capacity(), 1280 * 720 * 3);
        assert_eq!(buffer.allocations(), 2);
    }

    #[test]
    fn test_publish_before_geometry() {
        let mut buffer = FrameBuffer::new();
        assert!(matches!(buffer.publish(&[0; 16]), Err(VdkError::GeometryNotSet)));
        assert!(matches!(buffer.handle(), Err(VdkError::GeometryNotSet)));
        assert!(buffer.view().is_err());
    }

    #[test]
    fn test_short_publish_keeps_contents() {
        let mut buffer = FrameBuffer::new();
        buffer.ensure_geometry(Geometry::rgb(2, 2)).unwrap();
        buffer.publish(&[9; 12]).unwrap();

        let err = buffer.publish(&[1; 11]).unwrap_err();
        assert!(matches!(
            err,
            VdkError::SizeMismatch {
                expected: 12,
                actual: 11
            }
        ));
        assert_eq!(buffer.handle().unwrap(), &[9; 12]);
    }

    #[test]
    fn test_publish_copies_exactly_capacity() {
        let mut buffer = FrameBuffer::new();
        buffer.ensure_geometry(Geometry::rgb(1, 2)).unwrap();
        let source: Vec<u8> = (0..10).collect();
        buffer.publish(&source).unwrap();
        assert_eq!(buffer.handle().unwrap(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut buffer = FrameBuffer::new();
        buffer.ensure_geometry(Geometry::rgb(4, 4)).unwrap();
        buffer.release();
        buffer.release();
        assert_eq!(buffer.geometry(), None);
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.handle().is_err());

        // Re-establishing the same geometry after release allocates again.
        assert!(buffer.ensure_geometry(Geometry::rgb(4, 4)).unwrap());
        assert_eq!(buffer.allocations(), 2);
    }

    #[test]
    fn test_overflowing_geometry() {
        let mut buffer = FrameBuffer::new();
        buffer.ensure_geometry(Geometry::rgb(2, 2)).unwrap();
        let err = buffer
            .ensure_geometry(Geometry::new(u32::MAX, u32::MAX, 3))
            .unwrap_err();
        assert!(matches!(err, VdkError::Allocation(_)));
        assert_eq!(buffer.geometry(), None);
    }

    #[quickcheck]
    fn prop_handle_matches_geometry(steps: Vec<(u8, u8, u8)>) -> bool {
        let mut buffer = FrameBuffer::new();
        let mut expected_allocations = 0;
        let mut previous: Option<Geometry> = None;

        for (w, h, c) in steps {
            let geometry = Geometry::new(w as u32 % 64, h as u32 % 64, c as u32 % 5);
            let before = buffer.handle().ok().map(|s| s.as_ptr());
            let allocated = match buffer.ensure_geometry(geometry) {
                Ok(allocated) => allocated,
                Err(_) => return false,
            };
            if previous != Some(geometry) {
                expected_allocations += 1;
            } else if allocated || buffer.handle().ok().map(|s| s.as_ptr()) != before {
                return false;
            }
            previous = Some(geometry);

            let len = match buffer.handle() {
                Ok(handle) => handle.len(),
                Err(_) => return false,
            };
            if Some(len) != geometry.capacity() {
                return false;
            }
        }

        buffer.allocations() == expected_allocations
    }
}
