use std::cmp::Ordering;
use std::fmt;
use std::mem;

use crate::{PoolError, Result, SparseIndexMap, SparseIndices};

/// A two-way map between stable `u32` handles and positions in a dense array.
///
/// The table tracks which dense index every bound handle currently occupies and, in reverse,
/// which handle occupies every dense index. Callers keep their values in a dense array parallel
/// to the table's index space: when the table vacates an index by swap-and-pop, the caller does
/// the same to its own array and both stay aligned.
///
/// The handle to index direction is stored in a [`SparseIndexMap`] (by default the vector-backed
/// [`SparseIndices`]), the reverse direction in a plain vector.
///
/// Every operation is O(1), amortized for those that can grow storage.
///
/// # Example
///
/// ```rust
/// use sparse_pool::SparseHandles;
///
/// let mut table = SparseHandles::new();
/// let mut values = Vec::new();
///
/// let a = table.create();
/// values.push("a");
/// let b = table.create();
/// values.push("b");
///
/// // Removing `a` moves the last entry (`b`) into the vacated index.
/// let vacated = table.release(a);
/// values.swap_remove(vacated as usize);
///
/// assert_eq!(table.index_of(b), Some(0));
/// assert_eq!(values[0], "b");
/// ```
pub struct SparseHandles<I = SparseIndices> {
    indices: I,

    /// `handles[index]` is the handle bound to dense index `index`.
    handles: Vec<u32>,
}

impl SparseHandles<SparseIndices> {
    /// Creates an empty table backed by a vector indexed by handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: SparseIndexMap> SparseHandles<I> {
    /// Creates an empty table with the chosen index map backing.
    #[must_use]
    pub fn with_backing() -> Self {
        Self {
            indices: I::default(),
            handles: Vec::new(),
        }
    }

    /// Reserves room for at least `capacity` handles.
    ///
    /// This is a no-op for backings that do not benefit from reservation.
    pub fn ensure(&mut self, capacity: usize) {
        self.indices.ensure(capacity);
        self.handles
            .reserve(capacity.saturating_sub(self.handles.len()));
    }

    /// Issues a new handle without binding it to a dense index.
    ///
    /// The table never issues the same handle value twice. Reuse of retired handles is up to the
    /// caller, which can [`add()`][Self::add] a retired handle again.
    ///
    /// # Panics
    ///
    /// Panics if the handle space is exhausted.
    #[must_use]
    pub fn allocate(&mut self) -> u32 {
        self.indices.allocate()
    }

    /// Issues a new handle and binds it to the next dense index.
    ///
    /// # Panics
    ///
    /// Panics if the handle space is exhausted.
    #[must_use]
    pub fn create(&mut self) -> u32 {
        let handle = self.allocate();
        self.add(handle);
        handle
    }

    /// Binds `handle` to the next dense index (the current [`len()`][Self::len]) and returns
    /// that index.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is already bound, or if the backing cannot hold it.
    pub fn add(&mut self, handle: u32) -> u32 {
        assert!(
            self.indices.get(handle).is_none(),
            "handle {handle} is already bound"
        );

        let index = u32::try_from(self.handles.len())
            .expect("dense index space exhausted: every u32 index is bound");

        self.bind(handle, index);
        index
    }

    /// Records that `handle` lives at dense index `index`.
    ///
    /// `index` may be at most [`len()`][Self::len]. Binding at `len()` appends a new entry.
    /// Binding at a lower index replaces the handle at that index, and the displaced handle
    /// becomes unbound; the caller is then responsible for adding or discarding it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than `len()`, if `handle` is already bound to a different
    /// index, or if the backing cannot hold `handle`. Nothing is modified when this panics.
    pub fn bind(&mut self, handle: u32, index: u32) {
        if let Some(bound) = self.indices.get(handle) {
            assert_eq!(
                bound, index,
                "cannot bind handle {handle} to index {index}: it is already bound to index {bound}"
            );
        }

        match self.handles.len().cmp(&(index as usize)) {
            Ordering::Less => panic!(
                "cannot bind handle {handle} to index {index} beyond the end of the dense array ({})",
                self.handles.len()
            ),
            Ordering::Equal => self.handles.push(handle),
            Ordering::Greater => {
                let slot = self
                    .handles
                    .get_mut(index as usize)
                    .expect("guarded by the length comparison above");
                let displaced = mem::replace(slot, handle);

                if displaced != handle {
                    self.indices.erase(displaced);
                }
            }
        }

        self.indices.set(handle, index);
    }

    /// Unbinds `handle` and returns the dense index it vacated.
    ///
    /// The last entry of the dense index space moves into the vacated index (unless the vacated
    /// index was the last one), so the caller must swap-and-pop its parallel array at the
    /// returned index to stay aligned.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not bound.
    pub fn release(&mut self, handle: u32) -> u32 {
        match self.try_release(handle) {
            Ok(index) => index,
            Err(error) => panic!("{error}"),
        }
    }

    /// Unbinds `handle` and returns the dense index it vacated.
    ///
    /// Nothing is modified if an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if `handle` is not bound.
    pub fn try_release(&mut self, handle: u32) -> Result<u32> {
        let index = self
            .indices
            .get(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;

        let removed = self.handles.swap_remove(index as usize);
        debug_assert_eq!(removed, handle);

        // If the vacated index was the last one, nothing moved into it.
        if let Some(&moved) = self.handles.get(index as usize) {
            self.indices.set(moved, index);
        }

        self.indices.erase(handle);

        Ok(index)
    }

    /// The dense index bound to `handle`, if any.
    #[must_use]
    #[inline]
    pub fn index_of(&self, handle: u32) -> Option<u32> {
        self.indices.get(handle)
    }

    /// Whether `handle` is bound.
    #[must_use]
    pub fn contains(&self, handle: u32) -> bool {
        self.indices.get(handle).is_some()
    }

    /// The handle bound to dense index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`len()`][Self::len].
    #[must_use]
    pub fn handle_at(&self, index: u32) -> u32 {
        *self
            .handles
            .get(index as usize)
            .unwrap_or_else(|| panic!("dense index {index} is out of bounds"))
    }

    /// Every bound handle, in dense index order.
    #[must_use]
    pub fn handles(&self) -> &[u32] {
        &self.handles
    }

    /// The number of bound handles, which is also the length of the dense index space.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handles are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// How many handle values have been issued over the lifetime of the table.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.indices.issued()
    }

    /// Unbinds every handle. Handle values already issued are not issued again.
    pub fn clear(&mut self) {
        self.indices.clear();
        self.handles.clear();
    }

    /// Checks that the two directions of the map agree.
    ///
    /// # Panics
    ///
    /// Panics if any bound handle does not map back to itself.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        for (index, handle) in self.handles.iter().enumerate() {
            assert_eq!(
                self.indices.get(*handle).map(|bound| bound as usize),
                Some(index),
                "handle {handle} at dense index {index} is not bound to that index"
            );
        }

        assert_eq!(
            self.indices.bound_count(),
            self.handles.len(),
            "index map binds a different number of handles than the dense array holds"
        );
    }
}

impl<I: SparseIndexMap> Default for SparseHandles<I> {
    fn default() -> Self {
        Self::with_backing()
    }
}

impl<I: SparseIndexMap> fmt::Debug for SparseHandles<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseHandles")
            .field("indices", &self.indices)
            .field("handles", &self.handles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashIndices;

    fn swap_pop_relocates_last<I: SparseIndexMap>() {
        let mut table = SparseHandles::<I>::with_backing();

        let a = table.create();
        let b = table.create();
        let c = table.create();

        assert_eq!(table.index_of(a), Some(0));
        assert_eq!(table.index_of(c), Some(2));

        let vacated = table.release(a);

        assert_eq!(vacated, 0);
        assert_eq!(table.index_of(a), None);
        assert_eq!(table.index_of(c), Some(0));
        assert_eq!(table.index_of(b), Some(1));
        assert_eq!(table.handle_at(0), c);
        assert_eq!(table.len(), 2);

        table.integrity_check();
    }

    fn release_last_moves_nothing<I: SparseIndexMap>() {
        let mut table = SparseHandles::<I>::with_backing();

        let a = table.create();
        let b = table.create();

        let vacated = table.release(b);

        assert_eq!(vacated, 1);
        assert_eq!(table.index_of(a), Some(0));
        assert_eq!(table.index_of(b), None);
        table.integrity_check();

        // Releasing the only remaining entry leaves an empty, consistent table.
        assert_eq!(table.release(a), 0);
        assert!(table.is_empty());
        assert_eq!(table.index_of(a), None);
        table.integrity_check();
    }

    #[test]
    fn swap_pop_relocates_last_vector() {
        swap_pop_relocates_last::<SparseIndices>();
    }

    #[test]
    fn swap_pop_relocates_last_hash() {
        swap_pop_relocates_last::<HashIndices>();
    }

    #[test]
    fn release_last_moves_nothing_vector() {
        release_last_moves_nothing::<SparseIndices>();
    }

    #[test]
    fn release_last_moves_nothing_hash() {
        release_last_moves_nothing::<HashIndices>();
    }

    #[test]
    fn release_unbound_is_rejected() {
        let mut table = SparseHandles::new();
        let a = table.create();

        _ = table.release(a);

        assert_eq!(
            table.try_release(a),
            Err(PoolError::InvalidHandle { handle: a })
        );
        assert_eq!(
            table.try_release(1234),
            Err(PoolError::InvalidHandle { handle: 1234 })
        );
    }

    #[test]
    #[should_panic]
    fn double_release_panics() {
        let mut table = SparseHandles::new();
        let a = table.create();

        _ = table.release(a);
        _ = table.release(a);
    }

    #[test]
    fn retired_handle_can_be_added_again() {
        let mut table = SparseHandles::new();

        let a = table.create();
        let b = table.create();
        _ = table.release(a);

        assert_eq!(table.add(a), 1);
        assert_eq!(table.handles(), &[b, a]);
        assert_eq!(table.issued(), 2);
        table.integrity_check();
    }

    #[test]
    #[should_panic]
    fn adding_bound_handle_panics() {
        let mut table = SparseHandles::new();
        let a = table.create();
        table.add(a);
    }

    #[test]
    fn allocate_does_not_bind() {
        let mut table = SparseHandles::new();

        let a = table.allocate();

        assert!(!table.contains(a));
        assert!(table.is_empty());
        assert_eq!(table.issued(), 1);

        assert_eq!(table.add(a), 0);
        assert!(table.contains(a));
    }

    #[test]
    fn bind_relocates_handle() {
        let mut table = SparseHandles::new();

        let a = table.create();
        let b = table.allocate();

        // Overwrite index 0 with b. The displaced a is no longer bound anywhere.
        table.bind(b, 0);
        assert_eq!(table.handle_at(0), b);
        assert_eq!(table.index_of(b), Some(0));
        assert!(!table.contains(a));
        table.integrity_check();

        table.bind(a, 1);
        assert_eq!(table.handles(), &[b, a]);
        assert_eq!(table.index_of(a), Some(1));
        table.integrity_check();
    }

    #[test]
    fn bind_to_current_index_changes_nothing() {
        let mut table = SparseHandles::new();

        let a = table.create();
        let b = table.create();

        table.bind(a, 0);

        assert_eq!(table.handles(), &[a, b]);
        table.integrity_check();
    }

    #[test]
    fn bind_of_bound_handle_elsewhere_is_rejected_untouched() {
        let mut table = SparseHandles::new();

        let a = table.create();
        let b = table.create();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| table.bind(a, 1)));
        assert!(result.is_err());

        assert_eq!(table.handles(), &[a, b]);
        assert_eq!(table.index_of(a), Some(0));
        assert_eq!(table.index_of(b), Some(1));
        table.integrity_check();
    }

    #[test]
    #[should_panic]
    fn bind_beyond_end_panics() {
        let mut table = SparseHandles::new();
        let a = table.allocate();
        table.bind(a, 3);
    }

    #[test]
    fn clear_keeps_issued_handles_reserved() {
        let mut table = SparseHandles::new();

        let a = table.create();
        let b = table.create();
        table.clear();

        assert!(table.is_empty());
        assert!(!table.contains(a));
        assert!(!table.contains(b));

        let c = table.create();
        assert_ne!(c, a);
        assert_ne!(c, b);
        table.integrity_check();
    }

    #[test]
    fn uniqueness_and_consistency_over_random_walk() {
        let mut table = SparseHandles::<HashIndices>::with_backing();
        let mut live = Vec::new();
        let mut state = 0x9e37_79b9_u32;

        for _ in 0..500 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;

            if state % 3 == 0 && !live.is_empty() {
                let handle = live.swap_remove(state as usize % live.len());
                _ = table.release(handle);
            } else {
                live.push(table.create());
            }

            // Distinct live handles occupy distinct indices.
            let mut indices = live
                .iter()
                .map(|handle| table.index_of(*handle).unwrap())
                .collect::<Vec<_>>();
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices.len(), live.len());

            table.integrity_check();
        }
    }
}
