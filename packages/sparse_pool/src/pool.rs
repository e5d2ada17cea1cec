use std::any::type_name;
use std::fmt;

use tracing::{debug, trace};

use crate::{PoolError, Result, SparseHandles, SparsePoolBuilder};

/// Dense storage of values of type `T`, addressed through stable `u32` handles.
///
/// Values live contiguously in a vector parallel to the index space of a [`SparseHandles`]
/// table. Destroying a value swaps the last value into its place, so iteration always runs over
/// a gap-free slice, and every lookup is two array accesses.
///
/// Retired handles go to a free list and are reused, most recently retired first, before the
/// table issues new ones.
///
/// # Handles and generations
///
/// A raw `u32` handle addresses whatever value is currently bound to it. Once a handle is
/// retired and reused, the old raw value resolves to the new occupant. To tell the two apart,
/// every handle slot carries a generation that is bumped whenever its value is destroyed.
/// [`SparseHandle`][crate::SparseHandle] and [`OwnedHandle`][crate::OwnedHandle] capture the
/// generation when they are issued and refuse to resolve once it no longer matches.
///
/// # Addresses are not stable
///
/// Destroying any value may move another value to a different address. References obtained from
/// [`get()`][Self::get] are naturally scoped by the borrow checker, but raw pointers derived from
/// them become dangling or point to a different value after any destroy. Keep the handle, not the
/// pointer.
///
/// # Example
///
/// ```rust
/// use sparse_pool::SparsePool;
///
/// let mut pool = SparsePool::new();
///
/// let a = pool.insert("a".to_string());
/// let b = pool.insert("b".to_string());
///
/// pool.destroy(a);
///
/// // The retired handle is reused for the next value.
/// let c = pool.insert("c".to_string());
/// assert_eq!(c, a);
///
/// assert_eq!(pool.get(b), "b");
/// assert_eq!(pool.get(c), "c");
/// ```
pub struct SparsePool<T> {
    handles: SparseHandles,

    /// `objects[index]` is the value of the handle bound to dense index `index`.
    objects: Vec<T>,

    /// Retired handles, reused last-in first-out.
    available: Vec<u32>,

    /// `generations[handle]` is bumped every time the value of `handle` is destroyed.
    generations: Vec<u32>,
}

impl<T> SparsePool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new pool with a customized configuration.
    pub fn builder() -> SparsePoolBuilder<T> {
        SparsePoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(capacity: usize) -> Self {
        let mut handles = SparseHandles::new();
        handles.ensure(capacity);

        Self {
            handles,
            objects: Vec::with_capacity(capacity),
            available: Vec::new(),
            generations: Vec::with_capacity(capacity),
        }
    }

    /// The number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the pool holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The number of values the pool can hold without reallocating its value storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.objects.capacity()
    }

    /// Moves `value` into the pool and returns its handle.
    ///
    /// The handle is the most recently retired one if any is waiting for reuse, otherwise a
    /// handle never issued before.
    ///
    /// # Panics
    ///
    /// Panics if the handle space is exhausted.
    #[must_use]
    pub fn insert(&mut self, value: T) -> u32 {
        let handle = match self.available.pop() {
            Some(handle) => {
                trace!(
                    item_type = type_name::<T>(),
                    handle,
                    generation = self.generation_of(handle),
                    "reusing retired handle"
                );

                handle
            }
            None => {
                let handle = self.handles.allocate();

                if self.generations.len() <= handle as usize {
                    self.generations.resize((handle as usize).wrapping_add(1), 0);
                }

                handle
            }
        };

        self.handles.add(handle);
        self.objects.push(value);

        debug_assert_eq!(self.handles.len(), self.objects.len());

        handle
    }

    /// Destroys the value of `handle` and retires the handle for reuse.
    ///
    /// The last value in the dense storage moves into the vacated position.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not bound to a live value.
    pub fn destroy(&mut self, handle: u32) {
        drop(self.remove(handle));
    }

    /// Destroys the value of `handle` and retires the handle for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if `handle` is not bound to a live value. Nothing is
    /// modified in that case.
    pub fn try_destroy(&mut self, handle: u32) -> Result<()> {
        self.try_remove(handle).map(drop)
    }

    /// Takes the value of `handle` out of the pool and retires the handle for reuse.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not bound to a live value.
    pub fn remove(&mut self, handle: u32) -> T {
        match self.try_remove(handle) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Takes the value of `handle` out of the pool and retires the handle for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if `handle` is not bound to a live value. Nothing is
    /// modified in that case.
    pub fn try_remove(&mut self, handle: u32) -> Result<T> {
        let index = self.handles.try_release(handle)?;
        let value = self.objects.swap_remove(index as usize);

        self.available.push(handle);

        let generation = self
            .generations
            .get_mut(handle as usize)
            .expect("every handle that was ever bound has a generation");
        *generation = generation.wrapping_add(1);

        debug_assert_eq!(self.handles.len(), self.objects.len());

        Ok(value)
    }

    /// Takes the value of `handle` out of the pool if the handle slot is still at `generation`.
    pub(crate) fn remove_checked(&mut self, handle: u32, generation: u32) -> Result<T> {
        self.check(handle, generation)?;
        self.try_remove(handle)
    }

    /// Whether `handle` is bound to a live value.
    #[must_use]
    pub fn contains(&self, handle: u32) -> bool {
        self.handles.contains(handle)
    }

    /// The current generation of `handle`, or `None` if the pool never issued it.
    #[must_use]
    pub fn generation(&self, handle: u32) -> Option<u32> {
        self.generations.get(handle as usize).copied()
    }

    pub(crate) fn generation_of(&self, handle: u32) -> u32 {
        self.generation(handle).unwrap_or_default()
    }

    /// Returns the dense index of `handle` if it is live and the slot is still at `generation`.
    pub(crate) fn check(&self, handle: u32, generation: u32) -> Result<usize> {
        let actual = self
            .generation(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;

        if actual != generation {
            return Err(PoolError::StaleHandle {
                handle,
                expected: generation,
                actual,
            });
        }

        self.handles
            .index_of(handle)
            .map(|index| index as usize)
            .ok_or(PoolError::InvalidHandle { handle })
    }

    /// The value of `handle`.
    ///
    /// The reference cannot outlive the next mutation of the pool, which is exactly what keeps
    /// it from observing a value moved by swap-and-pop.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not bound to a live value.
    #[must_use]
    pub fn get(&self, handle: u32) -> &T {
        self.try_get(handle)
            .unwrap_or_else(|| panic!("{}", PoolError::InvalidHandle { handle }))
    }

    /// The value of `handle`, allowing mutation.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not bound to a live value.
    #[must_use]
    pub fn get_mut(&mut self, handle: u32) -> &mut T {
        self.try_get_mut(handle)
            .unwrap_or_else(|| panic!("{}", PoolError::InvalidHandle { handle }))
    }

    /// The value of `handle`, or `None` if the handle is not bound to a live value.
    #[must_use]
    pub fn try_get(&self, handle: u32) -> Option<&T> {
        let index = self.handles.index_of(handle)?;
        self.objects.get(index as usize)
    }

    /// The value of `handle`, or `None` if the handle is not bound to a live value.
    #[must_use]
    pub fn try_get_mut(&mut self, handle: u32) -> Option<&mut T> {
        let index = self.handles.index_of(handle)?;
        self.objects.get_mut(index as usize)
    }

    pub(crate) fn get_at(&self, index: usize) -> &T {
        self.objects
            .get(index)
            .expect("dense index was resolved from a bound handle")
    }

    pub(crate) fn get_at_mut(&mut self, index: usize) -> &mut T {
        self.objects
            .get_mut(index)
            .expect("dense index was resolved from a bound handle")
    }

    /// Iterates over every live value along with its handle, in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.handles.handles().iter().copied().zip(self.objects.iter())
    }

    /// Iterates over every live value along with its handle, in dense order, allowing mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.handles
            .handles()
            .iter()
            .copied()
            .zip(self.objects.iter_mut())
    }

    /// Every live value, in dense order.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.objects
    }

    /// Every live value, in dense order, allowing mutation.
    #[must_use]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.objects
    }

    /// Destroys every value.
    ///
    /// Handles that were live are not reused: any handle obtained before the clear stays invalid.
    pub fn clear(&mut self) {
        drop(self.take_values());
    }

    /// Retires every handle like [`clear()`][Self::clear] but hands the values back instead of
    /// dropping them.
    pub(crate) fn take_values(&mut self) -> Vec<T> {
        debug!(
            item_type = type_name::<T>(),
            discarded = self.objects.len(),
            "clearing sparse pool"
        );

        for &handle in self.handles.handles() {
            if let Some(generation) = self.generations.get_mut(handle as usize) {
                *generation = generation.wrapping_add(1);
            }
        }

        self.handles.clear();
        self.available.clear();

        std::mem::take(&mut self.objects)
    }

    /// Checks that handles, values, free list and generations agree.
    ///
    /// # Panics
    ///
    /// Panics if the pool state is inconsistent.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        self.handles.integrity_check();

        assert_eq!(
            self.handles.len(),
            self.objects.len(),
            "sparse pool of {} has {} bound handles but {} values",
            type_name::<T>(),
            self.handles.len(),
            self.objects.len()
        );

        for handle in &self.available {
            assert!(
                !self.handles.contains(*handle),
                "retired handle {handle} of sparse pool of {} is still bound",
                type_name::<T>()
            );
        }

        assert!(
            self.generations.len() >= self.handles.issued(),
            "sparse pool of {} is missing generations",
            type_name::<T>()
        );
    }
}

impl<T> Default for SparsePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SparsePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparsePool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("len", &self.objects.len())
            .field("handles", &self.handles)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

/// The type-erased interface of a [`SparsePool`], usable without knowing the item type.
///
/// # Example
///
/// ```rust
/// use sparse_pool::{HandlePool, SparsePool};
///
/// let mut numbers = SparsePool::new();
/// let mut names = SparsePool::new();
///
/// _ = numbers.insert(1_u32);
/// _ = names.insert("one".to_string());
///
/// let mut pools: Vec<&mut dyn HandlePool> = vec![&mut numbers, &mut names];
///
/// for pool in &mut pools {
///     pool.clear();
/// }
///
/// assert!(pools.iter().all(|pool| pool.is_empty()));
/// ```
pub trait HandlePool {
    /// The name of the item type, for diagnostics.
    fn item_type_name(&self) -> &'static str;

    /// Destroys every value. See [`SparsePool::clear()`].
    fn clear(&mut self);

    /// The number of live values.
    fn len(&self) -> usize;

    /// Whether the pool holds no live values.
    fn is_empty(&self) -> bool;
}

impl<T> HandlePool for SparsePool<T> {
    fn item_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SparsePool<u32>: Send, Sync, Default);
    assert_not_impl_any!(SparsePool<Rc<u32>>: Send);

    struct Droppable {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn retired_handle_is_reused_and_resolves_to_new_value() {
        let mut pool = SparsePool::new();

        let h1 = pool.insert("a".to_string());
        let h2 = pool.insert("b".to_string());

        pool.destroy(h1);

        let h3 = pool.insert("c".to_string());

        assert_eq!(h3, h1);
        assert_eq!(pool.get(h2), "b");

        // The raw value addresses whatever is bound to it now.
        assert_eq!(pool.get(h1), "c");

        // But the generation tells the two occupants apart.
        assert_eq!(pool.generation(h1), Some(1));
        assert_eq!(pool.generation(h2), Some(0));

        pool.integrity_check();
    }

    #[test]
    fn destroyed_handle_does_not_resolve() {
        let mut pool = SparsePool::new();

        let a = pool.insert(1);
        let b = pool.insert(2);

        pool.destroy(a);

        assert!(pool.try_get(a).is_none());
        assert!(pool.try_get_mut(a).is_none());
        assert!(!pool.contains(a));
        assert_eq!(*pool.get(b), 2);
    }

    #[test]
    #[should_panic]
    fn get_destroyed_handle_panics() {
        let mut pool = SparsePool::new();
        let a = pool.insert(1);
        pool.destroy(a);
        _ = pool.get(a);
    }

    #[test]
    fn second_destroy_is_rejected_without_damage() {
        let mut pool = SparsePool::new();

        let a = pool.insert(10);
        let b = pool.insert(20);
        let c = pool.insert(30);

        pool.destroy(a);

        assert_eq!(
            pool.try_destroy(a),
            Err(PoolError::InvalidHandle { handle: a })
        );

        assert_eq!(*pool.get(b), 20);
        assert_eq!(*pool.get(c), 30);
        assert_eq!(pool.len(), 2);

        // The handle is on the free list exactly once.
        let d = pool.insert(40);
        let e = pool.insert(50);
        assert_eq!(d, a);
        assert_ne!(e, a);

        pool.integrity_check();
    }

    #[test]
    #[should_panic]
    fn double_destroy_panics() {
        let mut pool = SparsePool::new();
        let a = pool.insert(1);
        pool.destroy(a);
        pool.destroy(a);
    }

    #[test]
    fn destroy_relocates_unrelated_value() {
        let mut pool = SparsePool::new();

        let a = pool.insert(1_u64);
        let _b = pool.insert(2_u64);
        let c = pool.insert(3_u64);

        let before: *const u64 = pool.get(c);

        pool.destroy(a);

        let after: *const u64 = pool.get(c);

        // c moved into a's old position; its old address now lies beyond the live values.
        assert_ne!(before, after);
        assert_eq!(pool.values()[0], 3);
        assert_eq!(*pool.get(c), 3);
    }

    #[test]
    fn remove_hands_value_back() {
        let mut pool = SparsePool::new();

        let a = pool.insert("kept".to_string());
        let value = pool.remove(a);

        assert_eq!(value, "kept");
        assert!(pool.is_empty());
    }

    #[test]
    fn destroy_runs_drop_once() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = SparsePool::new();

        let a = pool.insert(Droppable {
            drops: Rc::clone(&drops),
        });
        let _b = pool.insert(Droppable {
            drops: Rc::clone(&drops),
        });

        pool.destroy(a);
        assert_eq!(drops.get(), 1);

        drop(pool);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn live_handles_occupy_distinct_indices() {
        let mut pool = SparsePool::new();
        let mut live = Vec::new();

        for round in 0..300_u32 {
            if round % 4 == 3 {
                let handle = live.swap_remove((round as usize * 7) % live.len());
                pool.destroy(handle);
            } else {
                live.push(pool.insert(round));
            }

            let mut indices = live
                .iter()
                .map(|handle| pool.handles.index_of(*handle).unwrap())
                .collect::<Vec<_>>();
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices.len(), live.len());

            pool.integrity_check();
        }

        for (handle, value) in pool.iter() {
            assert!(live.contains(&handle));
            assert_eq!(pool.get(handle), value);
        }
    }

    #[test]
    fn clear_invalidates_everything() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = SparsePool::new();

        let a = pool.insert(Droppable {
            drops: Rc::clone(&drops),
        });
        let b = pool.insert(Droppable {
            drops: Rc::clone(&drops),
        });
        pool.destroy(b);

        pool.clear();

        assert_eq!(drops.get(), 2);
        assert!(pool.is_empty());
        assert!(!pool.contains(a));
        assert_eq!(pool.generation(a), Some(1));

        // Neither the live nor the retired handle is reused.
        let c = pool.insert(Droppable {
            drops: Rc::clone(&drops),
        });
        assert_ne!(c, a);
        assert_ne!(c, b);

        pool.integrity_check();
    }

    #[test]
    fn check_distinguishes_stale_from_unknown() {
        let mut pool = SparsePool::new();

        let a = pool.insert(1);
        assert_eq!(pool.check(a, 0), Ok(0));

        pool.destroy(a);
        assert_eq!(
            pool.check(a, 0),
            Err(PoolError::StaleHandle {
                handle: a,
                expected: 0,
                actual: 1,
            })
        );

        let reused = pool.insert(2);
        assert_eq!(reused, a);
        assert!(matches!(
            pool.check(a, 0),
            Err(PoolError::StaleHandle { .. })
        ));
        assert_eq!(pool.check(a, 1), Ok(0));

        assert_eq!(
            pool.check(99, 0),
            Err(PoolError::InvalidHandle { handle: 99 })
        );
    }

    #[test]
    fn iteration_in_dense_order() {
        let mut pool = SparsePool::new();

        let a = pool.insert('a');
        let b = pool.insert('b');
        let c = pool.insert('c');

        pool.destroy(a);

        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![(c, &'c'), (b, &'b')]);

        for (_, value) in pool.iter_mut() {
            *value = value.to_ascii_uppercase();
        }

        assert_eq!(pool.values(), &['C', 'B']);

        pool.values_mut()[0] = 'x';
        assert_eq!(*pool.get(c), 'x');
    }

    #[test]
    fn erased_clear_through_trait() {
        let mut pool = SparsePool::new();
        _ = pool.insert(5_u8);

        let erased: &mut dyn HandlePool = &mut pool;

        assert_eq!(erased.item_type_name(), "u8");
        assert_eq!(erased.len(), 1);

        erased.clear();
        assert!(erased.is_empty());
    }
}
