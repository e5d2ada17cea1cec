use std::any::type_name;
use std::fmt;
use std::mem::MaybeUninit;
use std::num::NonZero;
use std::ptr::NonNull;

use tracing::debug;

use crate::{Chunk, DropPolicy, PoolError, Result, TypedPoolBuilder};

/// Capacity of the first chunk of a [`TypedPool`] created without an explicit capacity.
pub const DEFAULT_POOL_CAPACITY: NonZero<usize> = NonZero::new(12).expect("12 is not zero");

/// An object pool for values of type `T`, handing out stable raw pointers.
///
/// The pool owns a chain of [`Chunk`]s. The first chunk has the configured initial capacity and
/// each successor doubles the capacity of its predecessor. Values never move once constructed.
///
/// The caller decides when a value goes away: [`destroy()`][1] drops it and returns the slot,
/// [`free()`][2] returns the slot without dropping (for values the caller already dropped or
/// moved out). Whatever is still live when the pool is dropped (or [reset][3]) is dropped
/// according to the pool's [`DropPolicy`].
///
/// # Out of band access
///
/// The pool does not keep references to its values, so it is valid to access values via the
/// returned pointers and to create references to them from unsafe code even when not holding
/// a reference to the pool, as long as you do not concurrently ask the pool for a conflicting
/// reference (e.g. via [`iter_mut()`][4]).
///
/// # Cleared pools
///
/// [`clear()`][5] releases every chunk. A cleared pool has zero capacity and refuses to construct
/// values until [`reset()`][3] gives it a fresh chain.
///
/// # Example
///
/// ```rust
/// use chunk_pool::TypedPool;
///
/// let mut pool = TypedPool::<String>::new();
///
/// let hello = pool.construct("hello".to_string());
/// let world = pool.construct("world".to_string());
///
/// let found = pool.find(|value| value.starts_with('w'));
/// assert_eq!(found, Some(world));
///
/// pool.destroy(hello);
/// assert_eq!(pool.len(), 1);
///
/// // SAFETY: The value is live and nothing else references it.
/// assert_eq!(unsafe { world.as_ref() }, "world");
/// ```
///
/// [1]: Self::destroy
/// [2]: Self::free
/// [3]: Self::reset
/// [4]: Self::iter_mut
/// [5]: Self::clear
pub struct TypedPool<T> {
    /// `None` if the pool has been cleared.
    head: Option<Chunk<T>>,

    initial_capacity: NonZero<usize>,
    drop_policy: DropPolicy,
}

impl<T> TypedPool<T> {
    /// Creates a new pool with [`DEFAULT_POOL_CAPACITY`] slots in its first chunk.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new pool with `capacity` slots in its first chunk.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn with_capacity(capacity: NonZero<usize>) -> Self {
        Self::builder().initial_capacity(capacity).build()
    }

    /// Starts building a new pool with a customized configuration.
    pub fn builder() -> TypedPoolBuilder<T> {
        TypedPoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(initial_capacity: NonZero<usize>, drop_policy: DropPolicy) -> Self {
        Self {
            head: Some(Chunk::new(initial_capacity, drop_policy)),
            initial_capacity,
            drop_policy,
        }
    }

    /// The drop policy the pool was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The capacity a [`reset()`][Self::reset] starts over with.
    #[must_use]
    pub fn initial_capacity(&self) -> NonZero<usize> {
        self.initial_capacity
    }

    /// The first chunk of the chain, or `None` if the pool has been cleared.
    #[must_use]
    pub fn chunk(&self) -> Option<&Chunk<T>> {
        self.head.as_ref()
    }

    /// The number of live values in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, Chunk::chain_len)
    }

    /// Whether the pool holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of slots across every chunk of the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.head.as_ref().map_or(0, Chunk::chain_capacity)
    }

    /// The number of chunks in the pool.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.head.as_ref().map_or(0, Chunk::chain_count)
    }

    /// Whether the pool was cleared and not yet reset.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.head.is_none()
    }

    /// Whether `ptr` addresses a live value of this pool.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.head.as_ref().is_some_and(|head| head.contains(ptr))
    }

    /// Moves `value` into the pool and returns a pointer to it.
    ///
    /// The pointer stays valid until the value is destroyed or freed, or until the pool is
    /// reset, cleared or dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been cleared.
    #[must_use]
    pub fn construct(&mut self, value: T) -> NonNull<T> {
        match self.try_construct(value) {
            Ok(ptr) => ptr,
            Err(error) => panic!("{error}"),
        }
    }

    /// Moves `value` into the pool and returns a pointer to it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Cleared`] (dropping `value`) if the pool has been cleared.
    pub fn try_construct(&mut self, value: T) -> Result<NonNull<T>> {
        Ok(self.head_mut()?.insert(value))
    }

    /// Constructs a value in place and returns a pointer to it.
    ///
    /// # Safety
    ///
    /// The closure must fully initialize the `MaybeUninit<T>` before returning.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been cleared.
    #[must_use]
    pub unsafe fn construct_with(&mut self, f: impl FnOnce(&mut MaybeUninit<T>)) -> NonNull<T> {
        let head = match self.head_mut() {
            Ok(head) => head,
            Err(error) => panic!("{error}"),
        };

        // SAFETY: Forwarding the initialization requirement to the caller.
        unsafe { head.insert_with(f) }
    }

    fn head_mut(&mut self) -> Result<&mut Chunk<T>> {
        self.head.as_mut().ok_or(PoolError::Cleared {
            item_type: type_name::<T>(),
        })
    }

    /// Drops the value at `ptr` and returns its slot to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not address a live value of this pool.
    pub fn destroy(&mut self, ptr: NonNull<T>) {
        if let Err(error) = self.try_destroy(ptr) {
            panic!("{error}");
        }
    }

    /// Returns the slot at `ptr` to the pool without dropping the value in it.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not address a live value of this pool.
    pub fn free(&mut self, ptr: NonNull<T>) {
        if let Err(error) = self.try_free(ptr) {
            panic!("{error}");
        }
    }

    /// Drops the value at `ptr` and returns its slot to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignPointer`] if no chunk of the pool owns the pointer (always
    /// the case for a cleared pool) and [`PoolError::DoubleRelease`] if the slot is not live.
    pub fn try_destroy(&mut self, ptr: NonNull<T>) -> Result<()> {
        self.owning_head(ptr)?.try_destroy(ptr)
    }

    /// Returns the slot at `ptr` to the pool without dropping the value in it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignPointer`] if no chunk of the pool owns the pointer (always
    /// the case for a cleared pool) and [`PoolError::DoubleRelease`] if the slot is not live.
    pub fn try_free(&mut self, ptr: NonNull<T>) -> Result<()> {
        self.owning_head(ptr)?.try_free(ptr)
    }

    fn owning_head(&mut self, ptr: NonNull<T>) -> Result<&mut Chunk<T>> {
        self.head.as_mut().ok_or(PoolError::ForeignPointer {
            address: ptr.as_ptr().addr(),
            item_type: type_name::<T>(),
        })
    }

    /// Discards the chunk chain and starts over with a single chunk of the initial capacity.
    ///
    /// Values still live in the old chain are dropped as the drop policy dictates, and every
    /// pointer previously handed out becomes invalid.
    pub fn reset(&mut self) {
        self.reset_with_capacity(self.initial_capacity);
    }

    /// Discards the chunk chain and starts over with a single chunk of `capacity` slots.
    ///
    /// Values still live in the old chain are dropped as the drop policy dictates, and every
    /// pointer previously handed out becomes invalid. Later resets use `capacity` as well.
    pub fn reset_with_capacity(&mut self, capacity: NonZero<usize>) {
        debug!(
            item_type = type_name::<T>(),
            capacity = capacity.get(),
            discarded = self.len(),
            "resetting typed pool"
        );

        // The old chain goes first, so that we never hold two chains at once.
        self.head = None;
        self.head = Some(Chunk::new(capacity, self.drop_policy));
        self.initial_capacity = capacity;
    }

    /// Releases every chunk of the pool.
    ///
    /// Values still live are dropped as the drop policy dictates. The pool is unusable for
    /// construction until [`reset()`][Self::reset].
    pub fn clear(&mut self) {
        debug!(
            item_type = type_name::<T>(),
            discarded = self.len(),
            "clearing typed pool"
        );

        self.head = None;
    }

    /// Iterates over every live value, chunk by chunk.
    ///
    /// The order within a chunk is unspecified. Each call starts over at the first chunk.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.head.iter().flat_map(Chunk::iter)
    }

    /// Iterates over every live value, chunk by chunk, allowing mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.head.iter_mut().flat_map(Chunk::iter_mut)
    }

    /// Calls `f` with every live value.
    pub fn for_each(&mut self, f: impl FnMut(&mut T)) {
        self.iter_mut().for_each(f);
    }

    /// Returns a pointer to the first live value for which `predicate` returns `true`.
    ///
    /// Values are visited in the same order as [`iter()`][Self::iter].
    #[must_use]
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<NonNull<T>> {
        self.head.as_ref()?.live_ptrs().find(|ptr| {
            // SAFETY: Live slots hold initialized values and we hold a shared borrow of the
            // pool, so nothing can mutate or remove them while the predicate looks.
            predicate(unsafe { ptr.as_ref() })
        })
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        if let Some(head) = &self.head {
            head.integrity_check();
        }
    }
}

impl<T> Default for TypedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("chunk_count", &self.chunk_count())
            .field("initial_capacity", &self.initial_capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(TypedPool<u32>: Send, Default);
    assert_not_impl_any!(TypedPool<u32>: Sync);
    assert_not_impl_any!(TypedPool<Rc<u32>>: Send);

    struct Droppable {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn construct_and_destroy() {
        let mut pool = TypedPool::<String>::new();

        let a = pool.construct("a".to_string());
        let b = pool.construct("b".to_string());

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.capacity(), 12);
        assert!(pool.contains(a));

        pool.destroy(a);

        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(a));
        assert_eq!(unsafe { b.as_ref() }, "b");

        pool.integrity_check();
    }

    #[test]
    fn growth_doubles_once_at_capacity_plus_one() {
        let mut pool = TypedPool::<u32>::with_capacity(NonZero::new(5).unwrap());

        let ptrs = (0..6).map(|value| pool.construct(value)).collect::<Vec<_>>();

        assert_eq!(pool.chunk_count(), 2);

        let head = pool.chunk().unwrap();
        assert_eq!(head.capacity(), 5);
        assert_eq!(head.len(), 5);

        let successor = head.successor().unwrap();
        assert_eq!(successor.capacity(), 10);
        assert_eq!(successor.len(), 1);

        for (ptr, expected) in ptrs.iter().zip(0..) {
            assert_eq!(unsafe { *ptr.as_ref() }, expected);
        }
    }

    #[test]
    fn free_does_not_drop() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = TypedPool::<Droppable>::new();

        let a = pool.construct(Droppable {
            drops: Rc::clone(&drops),
        });

        let value = unsafe { a.read() };
        pool.free(a);

        assert_eq!(drops.get(), 0);
        drop(value);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn construct_with_initializes_in_place() {
        let mut pool = TypedPool::<[u8; 16]>::new();

        let ptr = unsafe {
            pool.construct_with(|uninit| {
                uninit.write([7; 16]);
            })
        };

        assert_eq!(unsafe { ptr.as_ref() }, &[7; 16]);
    }

    #[test]
    fn reset_drops_live_values_and_restarts_chain() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = TypedPool::<Droppable>::with_capacity(NonZero::new(2).unwrap());

        // 2 + 4 slots hold the first six values, the seventh needs a third chunk of 8.
        for _ in 0..7 {
            _ = pool.construct(Droppable {
                drops: Rc::clone(&drops),
            });
        }

        assert_eq!(pool.chunk_count(), 3);
        assert_eq!(pool.capacity(), 14);

        pool.reset();

        assert_eq!(drops.get(), 7);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn reset_with_capacity_changes_initial_capacity() {
        let mut pool = TypedPool::<u32>::new();

        pool.reset_with_capacity(NonZero::new(100).unwrap());
        assert_eq!(pool.capacity(), 100);

        pool.reset();
        assert_eq!(pool.capacity(), 100);
        assert_eq!(pool.initial_capacity().get(), 100);
    }

    #[test]
    fn clear_releases_storage_until_reset() {
        let mut pool = TypedPool::<u32>::new();
        let a = pool.construct(1);

        pool.clear();

        assert!(pool.is_cleared());
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.chunk_count(), 0);
        assert_eq!(pool.iter().count(), 0);
        assert_eq!(
            pool.try_construct(2),
            Err(PoolError::Cleared { item_type: "u32" })
        );
        assert!(matches!(
            pool.try_destroy(a),
            Err(PoolError::ForeignPointer { .. })
        ));

        pool.reset();

        assert!(!pool.is_cleared());
        let b = pool.construct(3);
        assert_eq!(unsafe { *b.as_ref() }, 3);
    }

    #[test]
    #[should_panic]
    fn construct_on_cleared_pool_panics() {
        let mut pool = TypedPool::<u32>::new();
        pool.clear();
        _ = pool.construct(1);
    }

    #[test]
    fn iteration_covers_whole_chain_and_restarts() {
        let mut pool = TypedPool::<u32>::with_capacity(NonZero::new(3).unwrap());

        for value in 1..=10 {
            _ = pool.construct(value);
        }

        assert_eq!(pool.iter().sum::<u32>(), 55);
        assert_eq!(pool.iter().count(), 10);

        pool.for_each(|value| *value += 1);
        assert_eq!(pool.iter().sum::<u32>(), 65);

        for value in pool.iter_mut() {
            *value = 0;
        }
        assert!(pool.iter().all(|value| *value == 0));
    }

    #[test]
    fn find_returns_first_match_or_none() {
        let mut pool = TypedPool::<u32>::with_capacity(NonZero::new(2).unwrap());

        let _a = pool.construct(10);
        let b = pool.construct(20);
        let c = pool.construct(30);

        assert_eq!(pool.find(|value| *value == 20), Some(b));
        assert_eq!(pool.find(|value| *value > 25), Some(c));
        assert_eq!(pool.find(|value| *value > 100), None);

        pool.destroy(b);
        assert_eq!(pool.find(|value| *value == 20), None);
    }

    #[test]
    fn found_pointer_allows_mutation() {
        let mut pool = TypedPool::<u32>::new();
        _ = pool.construct(1);

        let mut found = pool.find(|value| *value == 1).unwrap();
        unsafe {
            *found.as_mut() = 2;
        }

        assert_eq!(pool.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn double_destroy_is_reported() {
        let mut pool = TypedPool::<u32>::new();
        let a = pool.construct(1);
        let b = pool.construct(2);

        pool.destroy(a);

        assert!(matches!(
            pool.try_destroy(a),
            Err(PoolError::DoubleRelease { .. })
        ));
        assert_eq!(unsafe { *b.as_ref() }, 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn drop_destroys_remaining_values() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut pool = TypedPool::<Droppable>::with_capacity(NonZero::new(1).unwrap());

            for _ in 0..4 {
                _ = pool.construct(Droppable {
                    drops: Rc::clone(&drops),
                });
            }
        }

        assert_eq!(drops.get(), 4);
    }

    #[test]
    #[should_panic]
    fn must_not_drop_policy_panics_on_drop_with_values() {
        let mut pool = TypedPool::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        _ = pool.construct(1);
    }

    #[test]
    fn debug_output_names_type() {
        let pool = TypedPool::<u16>::new();
        let text = format!("{pool:?}");

        assert!(text.contains("u16"));
        assert!(text.contains("capacity: 12"));
    }
}
