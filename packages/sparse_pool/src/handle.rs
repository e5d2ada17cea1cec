use std::cell::{Ref, RefMut};
use std::fmt;

use crate::{INVALID_HANDLE, LocalSparsePool, PoolError, Result};

/// A weak reference to a value in a [`LocalSparsePool`].
///
/// The handle pairs the raw `u32` handle value with the pool that issued it and the generation of
/// the handle slot at the time it was issued. Any number of copies may exist; none of them owns
/// the value. Once the value is destroyed (through any copy, an [`OwnedHandle`][1] or the pool
/// itself), every copy stops being live even if the raw handle value is later reused.
///
/// A default-constructed handle is invalid and attached to no pool.
///
/// The handle keeps the pool alive.
///
/// [1]: crate::OwnedHandle
pub struct SparseHandle<T> {
    pool: Option<LocalSparsePool<T>>,
    handle: u32,
    generation: u32,
}

impl<T> SparseHandle<T> {
    /// Wraps the raw `handle` of `pool`.
    ///
    /// The handle captures the current generation of the handle slot, so it refers to whatever
    /// value is bound to `handle` right now and never to a value bound to it later.
    ///
    /// Returns `None` if `handle` is not bound to a live value. Same as
    /// [`LocalSparsePool::handle()`].
    #[must_use]
    pub fn new(pool: &LocalSparsePool<T>, handle: u32) -> Option<Self> {
        pool.handle(handle)
    }

    pub(crate) fn from_parts(pool: LocalSparsePool<T>, handle: u32, generation: u32) -> Self {
        Self {
            pool: Some(pool),
            handle,
            generation,
        }
    }

    /// Whether the handle value is not the invalid sentinel.
    ///
    /// A valid handle is not necessarily live. See [`is_live()`][Self::is_live].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle != INVALID_HANDLE
    }

    /// Whether the handle refers to a value that has not been destroyed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_valid()
            && self
                .pool
                .as_ref()
                .is_some_and(|pool| pool.is_current(self.handle, self.generation))
    }

    /// The raw handle value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.handle
    }

    /// The generation of the handle slot this handle was issued at.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The pool this handle belongs to, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&LocalSparsePool<T>> {
        self.pool.as_ref()
    }

    /// Borrows the value.
    ///
    /// The pool stays borrowed while the guard exists: creating values in the same pool in the
    /// meantime panics, and destroying values is deferred until the guard is gone.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live or the pool is currently borrowed mutably.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.try_borrow() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Borrows the value mutably.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live or the pool is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        match self.try_borrow_mut() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Borrows the value.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Detached`] if the handle belongs to no pool, and
    /// [`PoolError::InvalidHandle`] or [`PoolError::StaleHandle`] if the handle is not live.
    pub fn try_borrow(&self) -> Result<Ref<'_, T>> {
        self.attached_pool()?.resolve(self.handle, self.generation)
    }

    /// Borrows the value mutably.
    ///
    /// # Errors
    ///
    /// Same as [`try_borrow()`][Self::try_borrow].
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>> {
        self.attached_pool()?
            .resolve_mut(self.handle, self.generation)
    }

    /// Destroys the value and resets this handle to the invalid value.
    ///
    /// Other copies of the handle are not reset but stop being live.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live, e.g. because the value was already destroyed through
    /// another copy.
    pub fn destroy(&mut self) {
        if let Err(error) = self.try_destroy() {
            panic!("cannot destroy {}: {error}", std::any::type_name::<T>());
        }
    }

    /// Destroys the value and resets this handle to the invalid value.
    ///
    /// If the pool is currently borrowed, the value is destroyed once the borrow ends (see
    /// [`LocalSparsePool`]). The handle stops being live right away.
    ///
    /// # Errors
    ///
    /// Same as [`try_borrow()`][Self::try_borrow]. Nothing is modified on error.
    pub fn try_destroy(&mut self) -> Result<()> {
        self.attached_pool()?
            .destroy_checked(self.handle, self.generation)?;

        self.handle = INVALID_HANDLE;
        Ok(())
    }

    fn attached_pool(&self) -> Result<&LocalSparsePool<T>> {
        let pool = self.pool.as_ref().ok_or(PoolError::Detached)?;

        if !self.is_valid() {
            return Err(PoolError::InvalidHandle {
                handle: self.handle,
            });
        }

        Ok(pool)
    }
}

impl<T> Clone for SparseHandle<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            handle: self.handle,
            generation: self.generation,
        }
    }
}

impl<T> Default for SparseHandle<T> {
    fn default() -> Self {
        Self {
            pool: None,
            handle: INVALID_HANDLE,
            generation: 0,
        }
    }
}

impl<T> PartialEq for SparseHandle<T> {
    /// Handles are equal if they refer to the same slot of the same pool at the same generation.
    fn eq(&self, other: &Self) -> bool {
        let same_pool = match (&self.pool, &other.pool) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };

        same_pool && self.handle == other.handle && self.generation == other.generation
    }
}

impl<T> Eq for SparseHandle<T> {}

impl<T> fmt::Debug for SparseHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseHandle")
            .field("item_type", &format_args!("{}", std::any::type_name::<T>()))
            .field("handle", &self.handle)
            .field("generation", &self.generation)
            .field("attached", &self.pool.is_some())
            .finish()
    }
}
