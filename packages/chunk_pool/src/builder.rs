use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DEFAULT_POOL_CAPACITY, DropPolicy, TypedPool};

/// Builder for creating an instance of [`TypedPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`TypedPool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use chunk_pool::{DropPolicy, TypedPool};
///
/// let pool = TypedPool::<u32>::builder()
///     .initial_capacity(NonZero::new(64).unwrap())
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// assert_eq!(pool.capacity(), 64);
/// ```
///
/// [1]: TypedPool::new
#[must_use]
pub struct TypedPoolBuilder<T> {
    initial_capacity: NonZero<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for TypedPoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedPoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("initial_capacity", &self.initial_capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> TypedPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            initial_capacity: DEFAULT_POOL_CAPACITY,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the capacity of the first chunk of the pool. Successor chunks double it.
    ///
    /// This is also the capacity that [`TypedPool::reset()`][1] starts over with.
    ///
    /// [1]: TypedPool::reset
    pub fn initial_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining items in the pool when the pool (or its chunk chain) is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn build(self) -> TypedPool<T> {
        TypedPool::new_inner(self.initial_capacity, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let pool = TypedPoolBuilder::<u64>::new().build();

        assert_eq!(pool.capacity(), DEFAULT_POOL_CAPACITY.get());
        assert_eq!(pool.drop_policy(), DropPolicy::MayDropItems);
    }

    #[test]
    fn debug_names_item_type() {
        let builder = TypedPoolBuilder::<String>::new();

        let text = format!("{builder:?}");
        assert!(text.contains("String"));
        assert!(text.contains("initial_capacity"));
    }

    #[test]
    fn overrides_are_applied() {
        let pool = TypedPool::<u8>::builder()
            .initial_capacity(NonZero::new(3).unwrap())
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.drop_policy(), DropPolicy::MustNotDropItems);
    }
}
