use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::{OwnedHandle, PoolError, Result, SparseHandle, SparsePool, SparsePoolBuilder};

/// A single-threaded shared wrapper around [`SparsePool`] that hands out handle objects.
///
/// This type acts as a cloneable reference to a shared [`SparsePool`] instance. Every clone, and
/// every [`SparseHandle`] or [`OwnedHandle`] issued by the pool, keeps the pool alive.
///
/// Values created through [`create()`][1] are owned by the returned [`OwnedHandle`] and are
/// destroyed when it is dropped.
///
/// # Single-threaded Design
///
/// This type is designed for single-threaded use and is neither [`Send`] nor [`Sync`].
///
/// # Deferred destruction
///
/// Destroying a value while the pool is borrowed (inside [`with_mut()`][2], or while a guard from
/// [`SparseHandle::borrow()`] is alive) does not panic. A typical case is a value that owns an
/// [`OwnedHandle`] to another value of the same pool and drops it while being mutated. The handle
/// stops being live immediately and the value is destroyed on the next pool operation that can
/// borrow the pool mutably.
///
/// # Example
///
/// ```rust
/// use sparse_pool::LocalSparsePool;
///
/// let pool = LocalSparsePool::new();
///
/// let owned = pool.create("hello".to_string());
/// let weak = owned.as_handle();
///
/// assert_eq!(*weak.borrow(), "hello");
/// assert_eq!(pool.len(), 1);
///
/// drop(owned);
///
/// assert!(pool.is_empty());
/// assert!(!weak.is_live());
/// ```
///
/// [1]: Self::create
/// [2]: Self::with_mut
pub struct LocalSparsePool<T> {
    inner: Rc<Shared<T>>,
}

struct Shared<T> {
    pool: RefCell<SparsePool<T>>,

    /// `(handle, generation)` of values destroyed while `pool` was borrowed.
    deferred: RefCell<Vec<(u32, u32)>>,
}

impl<T> From<SparsePool<T>> for LocalSparsePool<T> {
    /// Wraps an existing pool, including any values already in it.
    fn from(pool: SparsePool<T>) -> Self {
        Self {
            inner: Rc::new(Shared {
                pool: RefCell::new(pool),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }
}

impl<T> LocalSparsePool<T> {
    /// Creates a new empty pool with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from(SparsePool::new())
    }

    /// Starts building a new pool with a customized configuration.
    ///
    /// Finish with [`SparsePoolBuilder::build_local()`].
    pub fn builder() -> SparsePoolBuilder<T> {
        SparsePool::builder()
    }

    /// Moves `value` into the pool and returns a handle that owns it.
    ///
    /// # Panics
    ///
    /// Panics if the pool is currently borrowed (e.g. through an outstanding
    /// [`SparseHandle::borrow()`] guard).
    #[must_use]
    pub fn create(&self, value: T) -> OwnedHandle<T> {
        self.release_deferred();

        let (handle, generation) = {
            let mut pool = self.inner.pool.borrow_mut();
            let handle = pool.insert(value);
            (handle, pool.generation_of(handle))
        };

        OwnedHandle::new(SparseHandle::from_parts(self.clone(), handle, generation))
    }

    /// Returns a weak handle to the value currently bound to the raw `handle`.
    ///
    /// Returns `None` if `handle` is not bound to a live value.
    #[must_use]
    pub fn handle(&self, handle: u32) -> Option<SparseHandle<T>> {
        self.release_deferred();

        let generation = {
            let pool = self.inner.pool.borrow();

            if !pool.contains(handle) {
                return None;
            }

            pool.generation_of(handle)
        };

        if self.is_deferred(handle, generation) {
            return None;
        }

        Some(SparseHandle::from_parts(self.clone(), handle, generation))
    }

    /// Destroys the value referenced by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another pool, is detached, or its value has already been
    /// destroyed.
    pub fn destroy(&self, handle: SparseHandle<T>) {
        if let Err(error) = self.try_destroy(handle) {
            panic!("{error}");
        }
    }

    /// Destroys the value referenced by `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignHandle`] if the handle belongs to another pool,
    /// [`PoolError::Detached`] if it belongs to no pool, and [`PoolError::InvalidHandle`] or
    /// [`PoolError::StaleHandle`] if its value has already been destroyed.
    pub fn try_destroy(&self, mut handle: SparseHandle<T>) -> Result<()> {
        self.verify_owner(&handle)?;
        handle.try_destroy()
    }

    /// Borrows the value referenced by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another pool or does not reference a live value, or if the
    /// pool is currently borrowed mutably.
    #[must_use]
    pub fn get<'a>(&'a self, handle: &SparseHandle<T>) -> Ref<'a, T> {
        let result = self
            .verify_owner(handle)
            .and_then(|()| self.resolve(handle.value(), handle.generation()));

        match result {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Calls `f` with the value referenced by `handle`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`try_destroy()`][Self::try_destroy], without destroying
    /// anything.
    pub fn with<R>(&self, handle: &SparseHandle<T>, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.verify_owner(handle)?;

        let result = {
            let value = self.resolve(handle.value(), handle.generation())?;
            f(&value)
        };

        self.release_deferred();
        Ok(result)
    }

    /// Calls `f` with the value referenced by `handle`, allowing mutation.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`try_destroy()`][Self::try_destroy], without destroying
    /// anything.
    pub fn with_mut<R>(&self, handle: &SparseHandle<T>, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.verify_owner(handle)?;

        let result = {
            let mut value = self.resolve_mut(handle.value(), handle.generation())?;
            f(&mut value)
        };

        self.release_deferred();
        Ok(result)
    }

    /// Destroys every value. Every handle issued so far stops being live.
    ///
    /// Owned handles whose value was destroyed this way do nothing when dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pool is currently borrowed.
    pub fn clear(&self) {
        // Values are dropped after the borrow ends, so their drop logic may use the pool.
        let discarded = self.inner.pool.borrow_mut().take_values();

        // Every generation moved on, so nothing deferred can match anymore.
        self.inner.deferred.borrow_mut().clear();

        drop(discarded);
    }

    /// The number of live values.
    ///
    /// Values destroyed while the pool is borrowed are counted until their destruction completes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.release_deferred();
        self.inner.pool.borrow().len()
    }

    /// Whether the pool holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two values refer to the same shared pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn verify_owner(&self, handle: &SparseHandle<T>) -> Result<()> {
        match handle.pool() {
            None => Err(PoolError::Detached),
            Some(pool) if pool.ptr_eq(self) => Ok(()),
            Some(_) => Err(PoolError::ForeignHandle {
                handle: handle.value(),
            }),
        }
    }

    pub(crate) fn resolve(&self, handle: u32, generation: u32) -> Result<Ref<'_, T>> {
        self.reject_deferred(handle, generation)?;

        let pool = self.inner.pool.borrow();
        let index = pool.check(handle, generation)?;

        Ok(Ref::map(pool, |pool| pool.get_at(index)))
    }

    pub(crate) fn resolve_mut(&self, handle: u32, generation: u32) -> Result<RefMut<'_, T>> {
        self.reject_deferred(handle, generation)?;

        let mut pool = self.inner.pool.borrow_mut();
        let index = pool.check(handle, generation)?;

        Ok(RefMut::map(pool, |pool| pool.get_at_mut(index)))
    }

    /// Destroys the value if the handle is still current, deferring the destruction if the pool
    /// is borrowed.
    pub(crate) fn destroy_checked(&self, handle: u32, generation: u32) -> Result<()> {
        self.reject_deferred(handle, generation)?;

        let Ok(mut pool) = self.inner.pool.try_borrow_mut() else {
            return self.defer_destroy(handle, generation);
        };

        let value = pool.remove_checked(handle, generation)?;

        // The value is dropped after the borrow ends, so its drop logic may use the pool.
        drop(pool);
        drop(value);

        self.release_deferred();
        Ok(())
    }

    fn defer_destroy(&self, handle: u32, generation: u32) -> Result<()> {
        // Under a shared borrow the handle can still be validated right away.
        if let Ok(pool) = self.inner.pool.try_borrow() {
            pool.check(handle, generation)?;
        }

        trace!(
            item_type = std::any::type_name::<T>(),
            handle, generation, "pool is borrowed, deferring destruction"
        );

        self.inner.deferred.borrow_mut().push((handle, generation));
        Ok(())
    }

    /// Completes deferred destructions, unless the pool is still borrowed.
    fn release_deferred(&self) {
        loop {
            let Ok(mut pool) = self.inner.pool.try_borrow_mut() else {
                return;
            };

            let batch = mem::take(&mut *self.inner.deferred.borrow_mut());

            if batch.is_empty() {
                return;
            }

            // Entries deferred under a mutable borrow were never validated, so stale ones are
            // skipped here.
            let released = batch
                .into_iter()
                .filter_map(|(handle, generation)| pool.remove_checked(handle, generation).ok())
                .collect::<Vec<_>>();

            drop(pool);

            trace!(
                item_type = std::any::type_name::<T>(),
                count = released.len(),
                "completed deferred destruction"
            );

            // Dropping these may defer more, hence the loop.
            drop(released);
        }
    }

    fn is_deferred(&self, handle: u32, generation: u32) -> bool {
        self.inner
            .deferred
            .borrow()
            .contains(&(handle, generation))
    }

    fn reject_deferred(&self, handle: u32, generation: u32) -> Result<()> {
        if self.is_deferred(handle, generation) {
            return Err(PoolError::InvalidHandle { handle });
        }

        Ok(())
    }

    pub(crate) fn is_current(&self, handle: u32, generation: u32) -> bool {
        !self.is_deferred(handle, generation)
            && self.inner.pool.borrow().check(handle, generation).is_ok()
    }
}

impl<T> Clone for LocalSparsePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for LocalSparsePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LocalSparsePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSparsePool")
            .field("pool", &self.inner.pool)
            .field("deferred", &self.inner.deferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(LocalSparsePool<u32>: Clone, Default);
    assert_not_impl_any!(LocalSparsePool<u32>: Send, Sync);

    #[test]
    fn clones_share_the_pool() {
        let pool = LocalSparsePool::new();
        let other = pool.clone();

        let owned = pool.create(1_u32);

        assert_eq!(other.len(), 1);
        assert!(other.ptr_eq(&pool));
        assert_eq!(*other.get(&owned.as_handle()), 1);
    }

    #[test]
    fn handle_wraps_raw_value() {
        let pool = LocalSparsePool::new();
        let owned = pool.create("x");

        let weak = pool.handle(owned.value()).unwrap();
        assert!(weak.is_live());
        assert_eq!(*weak.borrow(), "x");

        assert!(pool.handle(12345).is_none());
    }

    #[test]
    fn destroy_through_pool() {
        let pool = LocalSparsePool::new();
        let owned = pool.create(5_u8);

        let weak = owned.release();
        pool.destroy(weak.clone());

        assert!(pool.is_empty());
        assert!(!weak.is_live());
        assert!(matches!(
            pool.try_destroy(weak),
            Err(PoolError::StaleHandle { .. })
        ));
    }

    #[test]
    fn foreign_and_detached_handles_are_rejected() {
        let first = LocalSparsePool::new();
        let second = LocalSparsePool::new();

        let owned = first.create(1_i32);

        assert_eq!(
            second.try_destroy(owned.as_handle()),
            Err(PoolError::ForeignHandle {
                handle: owned.value(),
            })
        );
        assert_eq!(
            second.try_destroy(SparseHandle::default()),
            Err(PoolError::Detached)
        );
        assert!(second.with(&owned.as_handle(), |_| ()).is_err());

        assert_eq!(first.len(), 1);
    }

    #[test]
    fn with_and_with_mut() {
        let pool = LocalSparsePool::new();
        let owned = pool.create(10_u32);
        let weak = owned.as_handle();

        assert_eq!(pool.with(&weak, |value| *value + 1), Ok(11));

        pool.with_mut(&weak, |value| *value = 20).unwrap();
        assert_eq!(*pool.get(&weak), 20);
    }

    #[test]
    fn clear_makes_handles_stale_and_owned_drop_harmless() {
        let drops = Rc::new(Cell::new(0));

        struct Tracked(Rc<Cell<usize>>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let pool = LocalSparsePool::new();
        let a = pool.create(Tracked(Rc::clone(&drops)));
        let b = pool.create(Tracked(Rc::clone(&drops)));

        pool.clear();

        assert_eq!(drops.get(), 2);
        assert!(pool.is_empty());
        assert!(!a.is_live());

        let c = pool.create(Tracked(Rc::clone(&drops)));
        assert_ne!(c.value(), a.value());
        assert_ne!(c.value(), b.value());

        drop(a);
        drop(b);
        assert_eq!(drops.get(), 2);
        assert_eq!(pool.len(), 1);

        drop(c);
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn value_drop_may_use_the_pool() {
        struct Child {
            pool: LocalSparsePool<Child>,
            sibling: Option<OwnedHandle<Child>>,
        }

        let pool = LocalSparsePool::new();

        let inner = pool.create(Child {
            pool: pool.clone(),
            sibling: None,
        });
        let outer = pool.create(Child {
            pool: pool.clone(),
            sibling: Some(inner),
        });

        assert_eq!(pool.len(), 2);
        assert!(outer.borrow().pool.ptr_eq(&pool));

        // Dropping the outer value drops its sibling handle, which destroys the inner value.
        drop(outer);
        assert!(pool.is_empty());
    }

    struct Node {
        drops: Rc<Cell<usize>>,
        child: Option<OwnedHandle<Node>>,
    }

    impl Drop for Node {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn node(drops: &Rc<Cell<usize>>, child: Option<OwnedHandle<Node>>) -> Node {
        Node {
            drops: Rc::clone(drops),
            child,
        }
    }

    #[test]
    fn child_dropped_inside_with_mut_is_destroyed_afterwards() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let child = pool.create(node(&drops, None));
        let child_handle = child.as_handle();
        let parent = pool.create(node(&drops, Some(child)));

        pool.with_mut(&parent.as_handle(), |parent| parent.child = None).unwrap();

        assert_eq!(drops.get(), 1);
        assert!(!child_handle.is_live());
        assert_eq!(pool.len(), 1);
        assert!(parent.is_live());
    }

    #[test]
    fn child_dropped_under_borrow_guard_is_destroyed_on_next_access() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let first = pool.create(node(&drops, None));
        let first_handle = first.as_handle();
        let second = pool.create(node(&drops, None));
        let second_handle = second.as_handle();
        let parent = pool.create(node(&drops, Some(first)));

        // The taken handle is dropped while the guard is still alive.
        drop(parent.borrow_mut().child.take());

        assert!(!first_handle.is_live());
        assert_eq!(drops.get(), 0);

        assert_eq!(pool.len(), 2);
        assert_eq!(drops.get(), 1);

        parent.borrow_mut().child = Some(second);
        parent.borrow_mut().child = None;

        assert!(!second_handle.is_live());
        assert!(pool.handle(second_handle.value()).is_none());
        assert_eq!(pool.len(), 1);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn deferred_destruction_cascades() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let leaf = pool.create(node(&drops, None));
        let middle = pool.create(node(&drops, Some(leaf)));
        let root = pool.create(node(&drops, Some(middle)));

        root.borrow_mut().child = None;

        // The middle value drops the leaf handle while the pool is free again.
        let fresh = pool.create(node(&drops, None));

        assert_eq!(drops.get(), 2);
        assert_eq!(pool.len(), 2);
        assert!(fresh.is_live());
        assert!(root.is_live());
    }

    #[test]
    fn clear_discards_deferred_destruction() {
        let drops = Rc::new(Cell::new(0));
        let pool = LocalSparsePool::new();

        let child = pool.create(node(&drops, None));
        let parent = pool.create(node(&drops, Some(child)));

        parent.borrow_mut().child = None;
        pool.clear();

        assert_eq!(drops.get(), 2);
        assert!(pool.is_empty());

        let fresh = pool.create(node(&drops, None));
        assert_eq!(pool.len(), 1);
        assert!(fresh.is_live());
    }
}
