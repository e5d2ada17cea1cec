use std::cell::{Ref, RefMut};
use std::fmt;
use std::mem;

use tracing::trace;

use crate::{PoolError, Result, SparseHandle};

/// The exclusive owner of a value in a [`LocalSparsePool`][1].
///
/// Dropping the owned handle destroys the value. Ownership moves with the handle: assigning a new
/// owned handle over an existing one destroys the value of the overwritten one, and the value is
/// destroyed exactly once however many times the handle is moved.
///
/// The owned handle cannot be cloned. Use [`as_handle()`][Self::as_handle] to obtain weak
/// [`SparseHandle`]s to the same value.
///
/// If the value is destroyed by other means first (through a weak handle or by clearing the
/// pool), dropping the owned handle does nothing.
///
/// Dropping the owned handle while the pool is borrowed is allowed, e.g. when a value in the pool
/// drops a handle to another value of the same pool while it is being mutated. The destruction is
/// then deferred as described in [`LocalSparsePool`][1].
///
/// # Example
///
/// ```rust
/// use sparse_pool::LocalSparsePool;
///
/// let pool = LocalSparsePool::new();
///
/// let mut slot = pool.create(1_u32);
/// let first = slot.as_handle();
///
/// // The value of the overwritten handle is destroyed.
/// slot = pool.create(2);
///
/// assert!(!first.is_live());
/// assert_eq!(*slot.borrow(), 2);
/// assert_eq!(pool.len(), 1);
/// ```
///
/// [1]: crate::LocalSparsePool
pub struct OwnedHandle<T> {
    handle: SparseHandle<T>,
}

impl<T> OwnedHandle<T> {
    pub(crate) fn new(handle: SparseHandle<T>) -> Self {
        Self { handle }
    }

    /// A weak handle to the owned value.
    #[must_use]
    pub fn as_handle(&self) -> SparseHandle<T> {
        self.handle.clone()
    }

    /// Gives up ownership without destroying the value.
    ///
    /// The value stays in the pool until destroyed through the returned handle (or a copy of it)
    /// or until the pool is cleared or dropped.
    #[must_use]
    pub fn release(mut self) -> SparseHandle<T> {
        mem::take(&mut self.handle)
    }

    /// Moves ownership out, leaving an invalid owned handle behind.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Exchanges the values owned by two handles.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.handle, &mut other.handle);
    }

    /// Whether the handle value is not the invalid sentinel.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Whether the owned value has not been destroyed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    /// The raw handle value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.handle.value()
    }

    /// Borrows the value.
    ///
    /// # Panics
    ///
    /// Panics if the value is no longer live or the pool is currently borrowed mutably.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.handle.borrow()
    }

    /// Borrows the value mutably.
    ///
    /// # Panics
    ///
    /// Panics if the value is no longer live or the pool is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.handle.borrow_mut()
    }

    /// Borrows the value.
    ///
    /// # Errors
    ///
    /// Same as [`SparseHandle::try_borrow()`].
    pub fn try_borrow(&self) -> Result<Ref<'_, T>> {
        self.handle.try_borrow()
    }

    /// Borrows the value mutably.
    ///
    /// # Errors
    ///
    /// Same as [`SparseHandle::try_borrow()`].
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>> {
        self.handle.try_borrow_mut()
    }

    /// Destroys the value now instead of when the handle is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the value was already destroyed by other means.
    pub fn destroy(mut self) {
        self.handle.destroy();
    }
}

impl<T> Default for OwnedHandle<T> {
    fn default() -> Self {
        Self {
            handle: SparseHandle::default(),
        }
    }
}

impl<T> Drop for OwnedHandle<T> {
    fn drop(&mut self) {
        if !self.handle.is_valid() {
            return;
        }

        match self.handle.try_destroy() {
            Ok(()) => {}
            Err(PoolError::StaleHandle { handle, .. } | PoolError::InvalidHandle { handle }) => {
                trace!(
                    item_type = std::any::type_name::<T>(),
                    handle, "owned value was already destroyed"
                );
            }
            Err(error) => panic!("{error}"),
        }
    }
}

impl<T> fmt::Debug for OwnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::LocalSparsePool;

    assert_not_impl_any!(OwnedHandle<u32>: Clone, Copy, Send, Sync);

    struct Droppable {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn droppable(drops: &Rc<Cell<usize>>) -> Droppable {
        Droppable {
            drops: Rc::clone(drops),
        }
    }

    #[test]
    fn drop_destroys_once() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let owned = pool.create(droppable(&drops));
        let moved = owned;
        let moved_again = Some(moved);

        assert_eq!(drops.get(), 0);

        drop(moved_again);

        assert_eq!(drops.get(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn assignment_destroys_overwritten_value_only() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let mut target = pool.create(droppable(&drops));
        let source = pool.create(droppable(&drops));
        let source_handle = source.as_handle();

        assert!(target.is_live());
        target = source;

        assert_eq!(drops.get(), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(target.as_handle(), source_handle);

        drop(target);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn take_leaves_invalid_handle() {
        let pool = LocalSparsePool::new();
        let mut original = pool.create(3_u16);

        let taken = original.take();

        assert!(!original.is_valid());
        assert!(taken.is_live());

        drop(original);
        assert_eq!(pool.len(), 1);

        drop(taken);
        assert!(pool.is_empty());
    }

    #[test]
    fn swap_exchanges_ownership() {
        let pool = LocalSparsePool::new();
        let mut a = pool.create('a');
        let mut b = pool.create('b');

        a.swap(&mut b);

        assert_eq!(*a.borrow(), 'b');
        assert_eq!(*b.borrow(), 'a');

        drop(a);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.with(&b.as_handle(), |value| *value), Ok('a'));
    }

    #[test]
    fn release_keeps_value() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let mut weak = pool.create(droppable(&drops)).release();

        assert_eq!(drops.get(), 0);
        assert!(weak.is_live());

        weak.destroy();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn drop_after_external_destroy_is_noop() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let owned = pool.create(droppable(&drops));
        let mut weak = owned.as_handle();
        weak.destroy();

        // The slot is reused by an unrelated value, which the stale owner must not touch.
        let unrelated = pool.create(droppable(&drops));
        assert_eq!(unrelated.value(), owned.value());

        drop(owned);

        assert_eq!(drops.get(), 1);
        assert!(unrelated.is_live());
    }

    #[test]
    fn explicit_destroy() {
        let pool = LocalSparsePool::new();
        let owned = pool.create(1_i64);
        let weak = owned.as_handle();

        owned.destroy();

        assert!(!weak.is_live());
        assert!(pool.is_empty());
    }

    #[test]
    fn default_drop_is_noop() {
        let owned = OwnedHandle::<String>::default();

        assert!(!owned.is_valid());
        assert!(owned.try_borrow().is_err());
    }

    #[test]
    fn borrow_mut_through_owner() {
        let pool = LocalSparsePool::new();
        let owned = pool.create(String::from("a"));

        owned.borrow_mut().push('b');
        assert_eq!(owned.try_borrow_mut().map(|value| value.len()), Ok(2));
        assert_eq!(*owned.borrow(), "ab");
    }
}
