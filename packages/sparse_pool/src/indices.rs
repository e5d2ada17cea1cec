use std::fmt::Debug;

use foldhash::HashMap;

/// The handle value that never refers to anything.
///
/// Handles and dense indices are `u32`, so this value is never issued as either.
pub const INVALID_HANDLE: u32 = u32::MAX;

/// Backing storage of the handle to dense index map of a [`SparseHandles`][crate::SparseHandles].
///
/// Two implementations are provided:
///
/// * [`SparseIndices`] - a vector indexed directly by handle. Lookup is a single array access but
///   memory use is proportional to the highest handle ever issued.
/// * [`HashIndices`] - a hash map keyed by handle. Memory use is proportional to the number of
///   bound handles, which suits handle spaces that are large or supplied from outside.
pub trait SparseIndexMap: Debug + Default {
    /// Issues a handle value that this map has not issued before. The handle starts unbound.
    ///
    /// # Panics
    ///
    /// Panics if the handle space is exhausted.
    fn allocate(&mut self) -> u32;

    /// The dense index bound to `handle`, if any.
    fn get(&self, handle: u32) -> Option<u32>;

    /// Binds `handle` to the dense index `index`, replacing any previous binding.
    ///
    /// # Panics
    ///
    /// Panics if the map cannot hold `handle` (e.g. a vector-backed map asked to bind a handle it
    /// never issued) or if either value is [`INVALID_HANDLE`].
    fn set(&mut self, handle: u32, index: u32);

    /// Removes the binding of `handle`. Does nothing if `handle` is not bound.
    fn erase(&mut self, handle: u32);

    /// Reserves room for at least `capacity` issued handles.
    fn ensure(&mut self, capacity: usize);

    /// Removes every binding. Handle values already issued are not issued again.
    fn clear(&mut self);

    /// How many handle values this map has issued (or, for maps accepting external handles, one
    /// past the highest handle value seen).
    fn issued(&self) -> usize;

    /// How many handles are currently bound.
    fn bound_count(&self) -> usize;
}

/// Handle to dense index map backed by a vector indexed directly by handle.
///
/// Handles are issued densely, starting from zero. Retired entries hold a sentinel instead of
/// being removed, so clearing the map keeps every issued handle value reserved.
#[derive(Clone, Debug, Default)]
pub struct SparseIndices {
    indices: Vec<u32>,
}

impl SparseIndexMap for SparseIndices {
    fn allocate(&mut self) -> u32 {
        let handle = u32::try_from(self.indices.len())
            .ok()
            .filter(|handle| *handle != INVALID_HANDLE)
            .expect("handle space exhausted: every u32 handle value has been issued");

        self.indices.push(INVALID_HANDLE);
        handle
    }

    fn get(&self, handle: u32) -> Option<u32> {
        self.indices
            .get(handle as usize)
            .copied()
            .filter(|index| *index != INVALID_HANDLE)
    }

    fn set(&mut self, handle: u32, index: u32) {
        assert_ne!(index, INVALID_HANDLE, "cannot bind handle {handle} to the invalid index");

        let entry = self
            .indices
            .get_mut(handle as usize)
            .unwrap_or_else(|| panic!("handle {handle} was never issued by this index map"));

        *entry = index;
    }

    fn erase(&mut self, handle: u32) {
        if let Some(entry) = self.indices.get_mut(handle as usize) {
            *entry = INVALID_HANDLE;
        }
    }

    fn ensure(&mut self, capacity: usize) {
        self.indices
            .reserve(capacity.saturating_sub(self.indices.len()));
    }

    fn clear(&mut self) {
        self.indices.fill(INVALID_HANDLE);
    }

    fn issued(&self) -> usize {
        self.indices.len()
    }

    #[cfg_attr(test, mutants::skip)] // Only used for integrity checks.
    fn bound_count(&self) -> usize {
        self.indices
            .iter()
            .filter(|index| **index != INVALID_HANDLE)
            .count()
    }
}

/// Handle to dense index map backed by a hash map keyed by handle.
///
/// Issued handles come from a counter. Handles supplied from outside (bound with
/// [`set()`][SparseIndexMap::set] without being allocated first) are accepted as well, and the
/// counter skips past them so that a later allocation never collides with them.
#[derive(Clone, Debug, Default)]
pub struct HashIndices {
    indices: HashMap<u32, u32>,
    next: u32,
}

impl SparseIndexMap for HashIndices {
    fn allocate(&mut self) -> u32 {
        let handle = self.next;
        assert_ne!(
            handle, INVALID_HANDLE,
            "handle space exhausted: every u32 handle value has been issued"
        );

        // Cannot overflow because handle is below u32::MAX.
        self.next = handle.wrapping_add(1);
        handle
    }

    fn get(&self, handle: u32) -> Option<u32> {
        self.indices.get(&handle).copied()
    }

    fn set(&mut self, handle: u32, index: u32) {
        assert_ne!(handle, INVALID_HANDLE, "cannot bind the invalid handle");
        assert_ne!(index, INVALID_HANDLE, "cannot bind handle {handle} to the invalid index");

        self.indices.insert(handle, index);

        if handle >= self.next {
            // Cannot overflow because handle is below u32::MAX.
            self.next = handle.wrapping_add(1);
        }
    }

    fn erase(&mut self, handle: u32) {
        self.indices.remove(&handle);
    }

    fn ensure(&mut self, _capacity: usize) {}

    fn clear(&mut self) {
        self.indices.clear();
    }

    fn issued(&self) -> usize {
        self.next as usize
    }

    fn bound_count(&self) -> usize {
        self.indices.len()
    }
}

impl HashIndices {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SparseIndices {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate_bind_erase<I: SparseIndexMap>() {
        let mut map = I::default();

        let a = map.allocate();
        let b = map.allocate();
        assert_ne!(a, b);
        assert_eq!(map.issued(), 2);

        assert_eq!(map.get(a), None);

        map.set(a, 0);
        map.set(b, 1);
        assert_eq!(map.get(a), Some(0));
        assert_eq!(map.get(b), Some(1));
        assert_eq!(map.bound_count(), 2);

        map.erase(a);
        assert_eq!(map.get(a), None);
        assert_eq!(map.bound_count(), 1);

        // Erasing twice is harmless.
        map.erase(a);
        assert_eq!(map.bound_count(), 1);

        map.clear();
        assert_eq!(map.get(b), None);
        assert_eq!(map.bound_count(), 0);

        // Cleared maps do not reissue handles.
        let c = map.allocate();
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn vector_backing_basics() {
        allocate_bind_erase::<SparseIndices>();
    }

    #[test]
    fn hash_backing_basics() {
        allocate_bind_erase::<HashIndices>();
    }

    #[test]
    fn vector_backing_issues_dense_handles() {
        let mut map = SparseIndices::new();

        assert_eq!(map.allocate(), 0);
        assert_eq!(map.allocate(), 1);
        assert_eq!(map.allocate(), 2);

        map.ensure(100);
        assert_eq!(map.issued(), 3);
        assert_eq!(map.allocate(), 3);
    }

    #[test]
    #[should_panic]
    fn vector_backing_rejects_unissued_handle() {
        let mut map = SparseIndices::new();
        map.set(5, 0);
    }

    #[test]
    fn hash_backing_accepts_external_handles() {
        let mut map = HashIndices::new();

        map.set(1_000_000, 0);
        assert_eq!(map.get(1_000_000), Some(0));

        // Allocation skips past the external handle.
        assert_eq!(map.allocate(), 1_000_001);
        assert_eq!(map.issued(), 1_000_002);

        // Memory is proportional to bound handles, not to the handle value.
        assert_eq!(map.bound_count(), 1);
    }

    #[test]
    #[should_panic]
    fn hash_backing_rejects_invalid_handle() {
        let mut map = HashIndices::new();
        map.set(INVALID_HANDLE, 0);
    }
}
