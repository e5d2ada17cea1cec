use std::marker::PhantomData;

use crate::{LocalSparsePool, SparsePool};

/// Builder for creating an instance of [`SparsePool`] or [`LocalSparsePool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`SparsePool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use sparse_pool::SparsePool;
///
/// let pool = SparsePool::<u32>::builder().capacity(1000).build();
/// assert!(pool.is_empty());
/// ```
///
/// [1]: SparsePool::new
#[must_use]
pub struct SparsePoolBuilder<T> {
    capacity: usize,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for SparsePoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparsePoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> SparsePoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            _item: PhantomData,
        }
    }

    /// Reserves room for `capacity` values (and their handles) up front.
    ///
    /// The pool still grows beyond this as needed.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds a pool with the specified configuration.
    #[must_use]
    pub fn build(self) -> SparsePool<T> {
        SparsePool::new_inner(self.capacity)
    }

    /// Builds a shared single-threaded pool with the specified configuration.
    #[must_use]
    pub fn build_local(self) -> LocalSparsePool<T> {
        LocalSparsePool::from(self.build())
    }
}
