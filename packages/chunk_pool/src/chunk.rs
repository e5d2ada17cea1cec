use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::any::type_name;
use std::mem::{self, MaybeUninit};
use std::num::NonZero;
use std::ptr::{self, NonNull};
use std::{fmt, slice, thread};

use tracing::debug;

use crate::{DropPolicy, PoolError, Result};

/// Each successor chunk has this many times the capacity of its predecessor.
pub const GROWTH_FACTOR: usize = 2;

/// Marks a slot that is not on the live list.
const VACANT: usize = usize::MAX;

/// Capacity of a chunk created without an explicit capacity.
pub const DEFAULT_CHUNK_CAPACITY: NonZero<usize> = NonZero::new(256).expect("256 is not zero");

/// A fixed-capacity block of slots for values of type `T`, chained to a larger successor once
/// every slot is in use.
///
/// The chunk owns one contiguous allocation holding `capacity` slots. Every slot is either on the
/// stack of available slots or on the list of live slots, never both. When the last available
/// slot is taken, the next insertion creates (once) a successor chunk with [`GROWTH_FACTOR`] times
/// the capacity and delegates to it. Chains only ever grow: a successor is never merged back or
/// released while its predecessor is alive.
///
/// # Stable addresses
///
/// A value never moves after it is inserted. The pointer returned by [`insert()`][1] stays valid
/// until the value is destroyed or freed, or until the chunk is dropped. The chunk does not hold
/// references to its values, so you may create references from the pointers in unsafe code as
/// long as you do not concurrently ask the chunk for a conflicting reference (e.g. via
/// [`iter_mut()`][2]).
///
/// # Example
///
/// ```rust
/// use std::num::NonZero;
///
/// use chunk_pool::{Chunk, DropPolicy};
///
/// let mut chunk = Chunk::<u32>::new(NonZero::new(2).unwrap(), DropPolicy::MayDropItems);
///
/// let a = chunk.insert(1);
/// let b = chunk.insert(2);
///
/// // The third value no longer fits and goes into a successor of double capacity.
/// let c = chunk.insert(3);
/// assert_eq!(chunk.successor().map(Chunk::capacity), Some(4));
///
/// // SAFETY: The values are live and nothing else references them.
/// unsafe {
///     assert_eq!(*a.as_ref(), 1);
///     assert_eq!(*b.as_ref(), 2);
///     assert_eq!(*c.as_ref(), 3);
/// }
///
/// chunk.destroy(b);
/// assert_eq!(chunk.chain_len(), 2);
/// ```
///
/// [1]: Self::insert
/// [2]: Self::iter_mut
pub struct Chunk<T> {
    capacity: NonZero<usize>,

    /// Start of the slot array. Valid for `capacity` slots of `T`.
    first_slot_ptr: NonNull<T>,

    /// Stack of vacant slots. The next insertion takes the slot at the top.
    available: Vec<NonNull<T>>,

    /// Slots that hold an initialized value, in no particular order.
    live: Vec<NonNull<T>>,

    /// `live_positions[slot]` is the position of slot number `slot` in `live`, or `VACANT`.
    live_positions: Vec<usize>,

    next: Option<Box<Chunk<T>>>,

    drop_policy: DropPolicy,
}

impl<T> Chunk<T> {
    /// Creates a new chunk with room for `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or if the slot array would not fit in the address space.
    #[must_use]
    pub fn new(capacity: NonZero<usize>, drop_policy: DropPolicy) -> Self {
        assert!(
            size_of::<T>() > 0,
            "Chunk must have non-zero item size ({} is zero-sized)",
            type_name::<T>()
        );

        let layout = Self::layout(capacity);

        // SAFETY: The layout is valid for the target type (Layout::array calculates it) and not
        // zero-sized (guarded by the assertion above and the non-zero capacity).
        let first_slot_ptr = NonNull::new(unsafe { alloc(layout) })
            .unwrap_or_else(|| handle_alloc_error(layout))
            .cast::<T>();

        // We push in reverse so that the first insertion takes the first slot.
        let available = (0..capacity.get())
            .rev()
            .map(|index| {
                // SAFETY: The allocation holds `capacity` slots and index is below capacity.
                unsafe { first_slot_ptr.add(index) }
            })
            .collect::<Vec<_>>();

        Self {
            capacity,
            first_slot_ptr,
            available,
            live: Vec::with_capacity(capacity.get()),
            live_positions: vec![VACANT; capacity.get()],
            next: None,
            drop_policy,
        }
    }

    #[must_use]
    fn layout(capacity: NonZero<usize>) -> Layout {
        Layout::array::<T>(capacity.get()).expect(
            "chunk capacity is limited to what fits in virtual memory, so the layout is calculable",
        )
    }

    /// The number of slots in this chunk, not counting successors.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The number of live values in this chunk, not counting successors.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// The number of vacant slots in this chunk, not counting successors.
    #[must_use]
    #[inline]
    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    /// Whether this chunk holds no live values. Successors are not considered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Whether every slot of this chunk holds a live value.
    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.available.is_empty()
    }

    /// The successor chunk, if this chunk has ever run out of slots.
    #[must_use]
    pub fn successor(&self) -> Option<&Self> {
        self.next.as_deref()
    }

    /// Iterates over this chunk and all its successors, in chain order.
    pub fn chunks(&self) -> impl Iterator<Item = &Self> {
        let mut current = Some(self);

        std::iter::from_fn(move || {
            let chunk = current?;
            current = chunk.successor();
            Some(chunk)
        })
    }

    /// The number of live values in the whole chain.
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.chunks().map(Self::len).sum()
    }

    /// The number of slots in the whole chain.
    #[must_use]
    pub fn chain_capacity(&self) -> usize {
        self.chunks().map(Self::capacity).sum()
    }

    /// The number of chunks in the chain, including this one.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chunks().count()
    }

    /// Inserts a value and returns a pointer to its slot.
    ///
    /// Takes a vacant slot from this chunk, or from the successor chain if this chunk is full,
    /// creating a successor if necessary. Never fails except on memory exhaustion.
    #[must_use]
    pub fn insert(&mut self, value: T) -> NonNull<T> {
        // SAFETY: The closure initializes the slot.
        unsafe {
            self.insert_with(|uninit: &mut MaybeUninit<T>| {
                uninit.write(value);
            })
        }
    }

    /// Inserts a value that is initialized in place by `f` and returns a pointer to its slot.
    ///
    /// If `f` panics, the slot is not consumed.
    ///
    /// # Safety
    ///
    /// The closure must fully initialize the `MaybeUninit<T>` before returning.
    #[must_use]
    pub unsafe fn insert_with(&mut self, f: impl FnOnce(&mut MaybeUninit<T>)) -> NonNull<T> {
        let Some(&slot) = self.available.last() else {
            // SAFETY: Forwarding the initialization requirement to the caller.
            return unsafe { self.successor_mut().insert_with(f) };
        };

        let mut uninit = slot.cast::<MaybeUninit<T>>();

        // SAFETY: The slot is vacant, in bounds of our allocation and nothing references it.
        f(unsafe { uninit.as_mut() });

        // Only now that the value exists do we move the slot from one list to the other.
        self.available.pop();
        self.live.push(slot);
        self.set_live_position(slot, self.live.len().wrapping_sub(1));

        debug_assert_eq!(
            self.available.len().wrapping_add(self.live.len()),
            self.capacity.get()
        );

        slot
    }

    fn successor_mut(&mut self) -> &mut Self {
        let capacity = self.capacity;
        let drop_policy = self.drop_policy;

        self.next.get_or_insert_with(|| {
            let capacity = capacity
                .checked_mul(NonZero::new(GROWTH_FACTOR).expect("growth factor is not zero"))
                .expect("chunk capacity cannot exceed the size of virtual memory");

            debug!(
                item_type = type_name::<T>(),
                capacity = capacity.get(),
                "chunk exhausted, creating successor"
            );

            Box::new(Self::new(capacity, drop_policy))
        })
    }

    /// Whether `ptr` addresses a live value anywhere in the chain.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.chunks().find_map(|chunk| chunk.live_position(ptr)).is_some()
    }

    /// The slot number of `ptr` if it points at the start of one of this chunk's slots, live or
    /// not.
    fn slot_index(&self, ptr: NonNull<T>) -> Option<usize> {
        let offset = ptr
            .as_ptr()
            .addr()
            .checked_sub(self.first_slot_ptr.as_ptr().addr())?;

        if offset % size_of::<T>() != 0 {
            return None;
        }

        offset
            .checked_div(size_of::<T>())
            .filter(|index| *index < self.capacity.get())
    }

    /// Whether `ptr` points at the start of one of this chunk's slots, live or not.
    fn owns_address(&self, ptr: NonNull<T>) -> bool {
        self.slot_index(ptr).is_some()
    }

    /// The position of `ptr` in this chunk's live list, if it is a live slot of this chunk.
    fn live_position(&self, ptr: NonNull<T>) -> Option<usize> {
        let index = self.slot_index(ptr)?;

        self.live_positions
            .get(index)
            .copied()
            .filter(|position| *position != VACANT)
    }

    fn set_live_position(&mut self, slot: NonNull<T>, position: usize) {
        let index = self
            .slot_index(slot)
            .expect("only slots of this chunk are ever tracked by it");

        *self
            .live_positions
            .get_mut(index)
            .expect("there is a position entry for every slot") = position;
    }

    /// Drops the value at `ptr` and returns its slot to the chain.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not address a live value in the chain.
    pub fn destroy(&mut self, ptr: NonNull<T>) {
        if let Err(error) = self.try_destroy(ptr) {
            panic!("{error}");
        }
    }

    /// Returns the slot at `ptr` to the chain without dropping the value in it.
    ///
    /// Use this when the value was already dropped (or moved out) through the pointer, or when the
    /// value does not need dropping.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not address a live value in the chain.
    pub fn free(&mut self, ptr: NonNull<T>) {
        if let Err(error) = self.try_free(ptr) {
            panic!("{error}");
        }
    }

    /// Drops the value at `ptr` and returns its slot to the chain.
    ///
    /// Nothing is modified if an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignPointer`] if no chunk in the chain owns the pointer and
    /// [`PoolError::DoubleRelease`] if the slot is not live.
    pub fn try_destroy(&mut self, ptr: NonNull<T>) -> Result<()> {
        self.release(ptr, true)
    }

    /// Returns the slot at `ptr` to the chain without dropping the value in it.
    ///
    /// Nothing is modified if an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignPointer`] if no chunk in the chain owns the pointer and
    /// [`PoolError::DoubleRelease`] if the slot is not live.
    pub fn try_free(&mut self, ptr: NonNull<T>) -> Result<()> {
        self.release(ptr, false)
    }

    fn release(&mut self, ptr: NonNull<T>, drop_value: bool) -> Result<()> {
        if !self.owns_address(ptr) {
            return match self.next.as_deref_mut() {
                Some(next) => next.release(ptr, drop_value),
                None => Err(PoolError::ForeignPointer {
                    address: ptr.as_ptr().addr(),
                    item_type: type_name::<T>(),
                }),
            };
        }

        let position = self
            .live_position(ptr)
            .ok_or_else(|| PoolError::DoubleRelease {
                address: ptr.as_ptr().addr(),
                item_type: type_name::<T>(),
            })?;

        self.live.swap_remove(position);

        // The last live slot moved into the vacated position, unless it was the removed one.
        if let Some(&moved) = self.live.get(position) {
            self.set_live_position(moved, position);
        }

        self.set_live_position(ptr, VACANT);
        self.available.push(ptr);

        if drop_value {
            // SAFETY: The slot was live, so it holds an initialized value, and we just took it
            // off the live list so nobody else will drop it.
            unsafe {
                ptr::drop_in_place(ptr.as_ptr());
            }
        }

        Ok(())
    }

    /// Iterates over every live value in the chain.
    ///
    /// Values are visited chunk by chunk, starting with this one. The order within a chunk is
    /// unspecified and changes as values are inserted and removed.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            live: self.live.iter(),
            next: self.successor(),
        }
    }

    /// Iterates over every live value in the chain, allowing mutation.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        let Self { live, next, .. } = self;

        IterMut {
            live: live.iter(),
            next: next.as_deref_mut(),
        }
    }

    /// Pointers to every live value in the chain, in the same order as [`iter()`][Self::iter].
    pub(crate) fn live_ptrs(&self) -> impl Iterator<Item = NonNull<T>> {
        self.chunks().flat_map(|chunk| chunk.live.iter().copied())
    }

    /// Checks that every slot of every chunk in the chain is accounted for exactly once.
    ///
    /// # Panics
    ///
    /// Panics if the chunk state is inconsistent.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        for chunk in self.chunks() {
            assert_eq!(
                chunk.available.len().wrapping_add(chunk.live.len()),
                chunk.capacity.get(),
                "slot count mismatch in chunk of {}",
                type_name::<T>()
            );

            let mut seen = chunk
                .available
                .iter()
                .chain(chunk.live.iter())
                .map(|slot| {
                    assert!(
                        chunk.owns_address(*slot),
                        "chunk of {} tracks a slot it does not own",
                        type_name::<T>()
                    );

                    slot.as_ptr().addr()
                })
                .collect::<Vec<_>>();

            seen.sort_unstable();
            seen.dedup();

            assert_eq!(
                seen.len(),
                chunk.capacity.get(),
                "chunk of {} tracks the same slot twice",
                type_name::<T>()
            );

            for (position, slot) in chunk.live.iter().enumerate() {
                assert_eq!(
                    chunk.live_position(*slot),
                    Some(position),
                    "chunk of {} has a stale live position",
                    type_name::<T>()
                );
            }

            for slot in &chunk.available {
                assert_eq!(
                    chunk.live_position(*slot),
                    None,
                    "chunk of {} has a live position for an available slot",
                    type_name::<T>()
                );
            }
        }
    }
}

impl<T> Drop for Chunk<T> {
    fn drop(&mut self) {
        let live = mem::take(&mut self.live);
        let was_empty = live.is_empty();

        for slot in live {
            // SAFETY: Live slots hold initialized values that nobody else will drop.
            unsafe {
                ptr::drop_in_place(slot.as_ptr());
            }
        }

        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(
                self.first_slot_ptr.as_ptr().cast(),
                Self::layout(self.capacity),
            );
        }

        // We do this check at the end so we clean up the memory first. If we are already
        // panicking, we do not want to panic again and obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty chunk of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

impl<T> fmt::Debug for Chunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("len", &self.live.len())
            .field("drop_policy", &self.drop_policy)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

// SAFETY: Yes, there are raw pointers involved here but nothing inherently non-thread-mobile
// about it, so as long as T itself can move between threads, the chunk can do so, too.
unsafe impl<T: Send> Send for Chunk<T> {}

/// Iterator over the live values of a chunk chain, created by [`Chunk::iter()`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    live: slice::Iter<'a, NonNull<T>>,
    next: Option<&'a Chunk<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(slot) = self.live.next() {
                // SAFETY: Live slots hold initialized values and we hold a shared borrow
                // of the chain, so nobody can mutate or remove them meanwhile.
                return Some(unsafe { slot.as_ref() });
            }

            let chunk = self.next.take()?;
            self.live = chunk.live.iter();
            self.next = chunk.successor();
        }
    }
}

/// Iterator over the live values of a chunk chain, created by [`Chunk::iter_mut()`].
#[derive(Debug)]
pub struct IterMut<'a, T> {
    live: slice::Iter<'a, NonNull<T>>,
    next: Option<&'a mut Chunk<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(slot) = self.live.next() {
                // SAFETY: Live slots hold initialized values, every slot is visited once and we
                // hold an exclusive borrow of the chain, so the reference is unique.
                return Some(unsafe { &mut *slot.as_ptr() });
            }

            let Chunk { live, next, .. } = self.next.take()?;
            self.live = live.iter();
            self.next = next.as_deref_mut();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Chunk<u32>: Send);
    assert_not_impl_any!(Chunk<u32>: Sync);
    assert_not_impl_any!(Chunk<Rc<u32>>: Send);

    fn capacity(n: usize) -> NonZero<usize> {
        NonZero::new(n).unwrap()
    }

    struct Droppable {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn smoke_test() {
        let mut chunk = Chunk::<u32>::new(capacity(3), DropPolicy::MayDropItems);

        let a = chunk.insert(42);
        let b = chunk.insert(43);
        let c = chunk.insert(44);

        unsafe {
            assert_eq!(*a.as_ref(), 42);
            assert_eq!(*b.as_ref(), 43);
            assert_eq!(*c.as_ref(), 44);
        }

        assert_eq!(chunk.len(), 3);
        assert!(chunk.is_full());

        chunk.destroy(b);

        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.available_len(), 1);

        let d = chunk.insert(45);

        // The freed slot is reused before anything else.
        assert_eq!(d, b);
        assert!(chunk.successor().is_none());

        chunk.integrity_check();
    }

    #[test]
    fn overflow_into_successor_of_double_capacity() {
        let mut chunk = Chunk::<i32>::new(capacity(4), DropPolicy::MayDropItems);

        let first_four = [1, 2, 3, 4].map(|value| chunk.insert(value));
        assert!(chunk.successor().is_none());

        let fifth = chunk.insert(5);

        let successor = chunk.successor().unwrap();
        assert_eq!(successor.capacity(), 8);
        assert_eq!(successor.len(), 1);
        assert!(successor.contains(fifth));

        for (ptr, expected) in first_four.iter().zip(1..) {
            assert_eq!(unsafe { *ptr.as_ref() }, expected);
        }

        assert_eq!(unsafe { *fifth.as_ref() }, 5);
        assert_eq!(chunk.chain_count(), 2);
        assert_eq!(chunk.chain_capacity(), 12);
        assert_eq!(chunk.chain_len(), 5);

        chunk.integrity_check();
    }

    #[test]
    fn successor_is_created_only_once() {
        let mut chunk = Chunk::<u64>::new(capacity(1), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        let b = chunk.insert(2);
        let c = chunk.insert(3);

        // 1 + 2 slots so far; the third value fits into the existing successor.
        assert_eq!(chunk.chain_count(), 2);

        chunk.destroy(a);
        chunk.destroy(b);
        chunk.destroy(c);

        assert_eq!(chunk.chain_len(), 0);
        assert_eq!(chunk.chain_capacity(), 3);
    }

    #[test]
    fn slot_conservation_across_random_operations() {
        let mut chunk = Chunk::<usize>::new(capacity(2), DropPolicy::MayDropItems);
        let mut held = Vec::new();

        for round in 0..200_usize {
            if round % 3 == 2 {
                let ptr: NonNull<usize> = held.swap_remove(round % held.len());
                chunk.destroy(ptr);
            } else {
                held.push(chunk.insert(round));
            }

            let available: usize = chunk.chunks().map(Chunk::available_len).sum();
            assert_eq!(available + chunk.chain_len(), chunk.chain_capacity());
            chunk.integrity_check();
        }

        chunk.integrity_check();
    }

    #[test]
    fn destroy_runs_drop_and_free_does_not() {
        let drops = Rc::new(Cell::new(0));
        let mut chunk = Chunk::<Droppable>::new(capacity(2), DropPolicy::MayDropItems);

        let a = chunk.insert(Droppable {
            drops: Rc::clone(&drops),
        });
        let b = chunk.insert(Droppable {
            drops: Rc::clone(&drops),
        });

        chunk.destroy(a);
        assert_eq!(drops.get(), 1);

        // Caller takes responsibility for the value.
        let value = unsafe { b.read() };
        chunk.free(b);
        assert_eq!(drops.get(), 1);

        drop(value);
        assert_eq!(drops.get(), 2);
        assert!(chunk.is_empty());
    }

    #[test]
    fn drop_destructs_live_values_exactly_once() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut chunk = Chunk::<Droppable>::new(capacity(2), DropPolicy::MayDropItems);

            for _ in 0..5 {
                _ = chunk.insert(Droppable {
                    drops: Rc::clone(&drops),
                });
            }

            assert_eq!(chunk.iter().count(), 5);
        }

        assert_eq!(drops.get(), 5);
    }

    #[test]
    fn double_release_is_rejected_without_damage() {
        let mut chunk = Chunk::<u32>::new(capacity(4), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        let b = chunk.insert(2);

        chunk.destroy(a);

        assert_eq!(
            chunk.try_destroy(a),
            Err(PoolError::DoubleRelease {
                address: a.as_ptr().addr(),
                item_type: "u32",
            })
        );

        assert_eq!(chunk.len(), 1);
        assert_eq!(unsafe { *b.as_ref() }, 2);
        chunk.integrity_check();
    }

    #[test]
    #[should_panic]
    fn double_destroy_panics() {
        let mut chunk = Chunk::<u32>::new(capacity(4), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        chunk.destroy(a);
        chunk.destroy(a);
    }

    #[test]
    fn foreign_pointer_is_rejected_without_damage() {
        let mut chunk = Chunk::<u32>::new(capacity(4), DropPolicy::MayDropItems);
        let mut other = Chunk::<u32>::new(capacity(4), DropPolicy::MayDropItems);

        let mine = chunk.insert(1);
        let theirs = other.insert(2);

        assert!(matches!(
            chunk.try_free(theirs),
            Err(PoolError::ForeignPointer { .. })
        ));

        let mut on_stack = 5_u32;
        assert!(matches!(
            chunk.try_destroy(NonNull::from(&mut on_stack)),
            Err(PoolError::ForeignPointer { .. })
        ));

        assert!(chunk.contains(mine));
        assert!(other.contains(theirs));
        chunk.integrity_check();
        other.integrity_check();
    }

    #[test]
    fn misaligned_pointer_into_chunk_is_foreign() {
        let mut chunk = Chunk::<u64>::new(capacity(4), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        let inside = unsafe { a.cast::<u8>().add(1).cast::<u64>() };

        assert!(matches!(
            chunk.try_destroy(inside),
            Err(PoolError::ForeignPointer { .. })
        ));
        assert!(chunk.contains(a));
    }

    #[test]
    fn release_in_successor_is_found() {
        let mut chunk = Chunk::<u32>::new(capacity(1), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        let b = chunk.insert(2);
        let c = chunk.insert(3);

        chunk.destroy(c);
        chunk.destroy(b);

        assert_eq!(chunk.successor().unwrap().len(), 0);
        assert!(chunk.contains(a));
        assert!(!chunk.contains(b));
    }

    #[test]
    fn release_keeps_moved_slot_addressable() {
        let mut chunk = Chunk::<u32>::new(capacity(4), DropPolicy::MayDropItems);

        let a = chunk.insert(1);
        let b = chunk.insert(2);
        let c = chunk.insert(3);

        // `c` is the last live slot and takes over the position of `a`.
        chunk.destroy(a);
        chunk.integrity_check();

        assert!(chunk.contains(c));
        chunk.destroy(c);
        chunk.integrity_check();

        assert!(!chunk.contains(c));
        assert!(matches!(
            chunk.try_free(c),
            Err(PoolError::DoubleRelease { .. })
        ));

        // Releasing the last live slot moves nothing.
        chunk.destroy(b);
        assert!(chunk.is_empty());
        chunk.integrity_check();
    }

    #[test]
    fn teardown_in_insertion_order_tracks_positions() {
        let mut chunk = Chunk::<usize>::new(capacity(8), DropPolicy::MayDropItems);

        let ptrs = (0..1_000).map(|value| chunk.insert(value)).collect::<Vec<_>>();

        for (step, ptr) in ptrs.iter().enumerate() {
            assert_eq!(unsafe { *ptr.as_ref() }, step);
            chunk.destroy(*ptr);

            if step % 97 == 0 {
                chunk.integrity_check();
            }
        }

        assert_eq!(chunk.chain_len(), 0);
        chunk.integrity_check();
    }

    #[test]
    fn iter_visits_chunks_in_chain_order() {
        let mut chunk = Chunk::<u32>::new(capacity(2), DropPolicy::MayDropItems);

        for value in 0..7 {
            _ = chunk.insert(value);
        }

        let mut seen = chunk.iter().copied().collect::<Vec<_>>();

        // The first chunk's values come first, then the successor's, then the one after that.
        assert!(seen[..2].iter().all(|v| *v < 2));
        assert!(seen[2..6].iter().all(|v| (2..6).contains(v)));
        assert_eq!(seen[6], 6);

        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());

        // Restartable.
        assert_eq!(chunk.iter().count(), 7);
    }

    #[test]
    fn iter_mut_updates_every_value() {
        let mut chunk = Chunk::<u32>::new(capacity(2), DropPolicy::MayDropItems);

        let ptrs = (0..5).map(|value| chunk.insert(value)).collect::<Vec<_>>();

        for value in chunk.iter_mut() {
            *value *= 10;
        }

        for (ptr, expected) in ptrs.iter().zip((0..5).map(|v| v * 10)) {
            assert_eq!(unsafe { *ptr.as_ref() }, expected);
        }
    }

    #[test]
    fn panicking_initializer_does_not_consume_slot() {
        let mut chunk = Chunk::<u32>::new(capacity(1), DropPolicy::MayDropItems);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            chunk.insert_with(|_| panic!("initializer failed"))
        }));

        assert!(result.is_err());
        assert_eq!(chunk.available_len(), 1);
        assert_eq!(chunk.len(), 0);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_values_panics_if_policy_must_not_drop() {
        let mut chunk = Chunk::<u32>::new(capacity(2), DropPolicy::MustNotDropItems);
        _ = chunk.insert(1);
    }

    #[test]
    fn drop_empty_with_must_not_drop_policy_is_ok() {
        let mut chunk = Chunk::<u32>::new(capacity(2), DropPolicy::MustNotDropItems);
        let a = chunk.insert(1);
        chunk.destroy(a);
        drop(chunk);
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(Chunk::<()>::new(capacity(2), DropPolicy::MayDropItems));
    }

    #[test]
    fn default_capacity_is_256() {
        let chunk = Chunk::<u8>::new(DEFAULT_CHUNK_CAPACITY, DropPolicy::default());
        assert_eq!(chunk.capacity(), 256);
        assert_eq!(chunk.available_len(), 256);
    }
}
