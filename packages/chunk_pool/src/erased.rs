use std::any::{Any, TypeId, type_name};
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{PoolError, Result, TypeKey, TypedPool};

/// Description used in errors when the type of an offered value cannot be named.
const UNNAMED_TYPE: &str = "another type";

/// The type-erased interface of a [`TypedPool`], usable without knowing the item type.
///
/// Generic infrastructure (e.g. a [`PoolRegistry`][crate::PoolRegistry] sweep) operates over
/// heterogeneous pools through this trait. Values move in and out as `Box<dyn Any>` and
/// [`ErasedRef`], both of which carry enough runtime type information for the pool to reject a
/// value of the wrong type instead of misinterpreting it.
///
/// # Example
///
/// ```rust
/// use chunk_pool::{Pool, TypedPool};
///
/// let mut pools: Vec<Box<dyn Pool>> = vec![
///     Box::new(TypedPool::<u32>::new()),
///     Box::new(TypedPool::<String>::new()),
/// ];
///
/// let item = pools[1].insert_erased(Box::new("hello".to_string())).unwrap();
/// assert_eq!(pools[1].len(), 1);
///
/// // The u32 pool refuses to touch a String.
/// assert!(pools[0].destroy_erased(item).is_err());
///
/// pools[1].destroy_erased(item).unwrap();
///
/// for pool in &mut pools {
///     pool.clear();
/// }
/// ```
pub trait Pool: Any {
    /// The key of the item type.
    fn type_key(&self) -> TypeKey;

    /// The name of the item type, for diagnostics.
    fn item_type_name(&self) -> &'static str;

    /// Moves the value out of the box and into the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] if the box does not hold a value of the item type and
    /// [`PoolError::Cleared`] if the pool has been cleared. The value is dropped in both cases.
    fn insert_erased(&mut self, value: Box<dyn Any>) -> Result<ErasedRef>;

    /// Drops the referenced value and returns its slot to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] if the reference is for another item type, otherwise
    /// the same errors as [`TypedPool::try_destroy()`].
    fn destroy_erased(&mut self, item: ErasedRef) -> Result<()>;

    /// Returns the referenced slot to the pool without dropping the value in it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] if the reference is for another item type, otherwise
    /// the same errors as [`TypedPool::try_free()`].
    fn free_erased(&mut self, item: ErasedRef) -> Result<()>;

    /// See [`TypedPool::reset()`].
    fn reset(&mut self);

    /// See [`TypedPool::reset_with_capacity()`].
    fn reset_with_capacity(&mut self, capacity: NonZero<usize>);

    /// See [`TypedPool::clear()`].
    fn clear(&mut self);

    /// The number of live values in the pool.
    fn len(&self) -> usize;

    /// Whether the pool holds no live values.
    fn is_empty(&self) -> bool;

    /// The number of slots across every chunk of the pool.
    fn capacity(&self) -> usize;

    /// Upcast for downcasting to the concrete pool type.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting to the concrete pool type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Upcast for downcasting to the concrete pool type.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// A [`Pool`] that can be moved to another thread.
///
/// Every pool whose item type is [`Send`] is one. The [process-wide registry][crate::global]
/// stores its pools as `dyn SendPool`.
pub trait SendPool: Pool + Send {}

impl<P: Pool + Send> SendPool for P {}

/// An erased pool type that a [`PoolRegistry`][crate::PoolRegistry] can store pools of `T` as.
///
/// Implemented for `dyn Pool`, which accepts any `'static` item type, and for `dyn SendPool`,
/// which accepts item types that are [`Send`].
pub trait ErasedPool<T>: Pool {
    /// Erases the item type of `pool`.
    fn erase(pool: TypedPool<T>) -> Box<Self>;
}

impl<T: 'static> ErasedPool<T> for dyn Pool {
    fn erase(pool: TypedPool<T>) -> Box<Self> {
        Box::new(pool)
    }
}

impl<T: Send + 'static> ErasedPool<T> for dyn SendPool {
    fn erase(pool: TypedPool<T>) -> Box<Self> {
        Box::new(pool)
    }
}

/// A type-tagged pointer to a value in a pool, returned by [`Pool::insert_erased()`].
///
/// The reference does not keep the value alive. It is merely a pointer that remembers which
/// type it points to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ErasedRef {
    ptr: NonNull<()>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ErasedRef {
    /// Tags a pointer with the type it points to.
    #[must_use]
    pub fn new<T: 'static>(ptr: NonNull<T>) -> Self {
        Self {
            ptr: ptr.cast(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// The key of the type the pointer points to.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        TypeKey::of_type_id(self.type_id, self.type_name)
    }

    /// The name of the type the pointer points to.
    #[must_use]
    pub fn item_type_name(&self) -> &'static str {
        self.type_name
    }

    /// The untyped pointer.
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<()> {
        self.ptr
    }

    /// The typed pointer, if the reference points to a `T`.
    #[must_use]
    pub fn downcast<T: 'static>(&self) -> Option<NonNull<T>> {
        (self.type_id == TypeId::of::<T>()).then(|| self.ptr.cast())
    }

    fn downcast_for<T: 'static>(&self) -> Result<NonNull<T>> {
        self.downcast::<T>().ok_or(PoolError::TypeMismatch {
            expected: type_name::<T>(),
            actual: self.type_name,
        })
    }
}

impl<T: 'static> Pool for TypedPool<T> {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn item_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn insert_erased(&mut self, value: Box<dyn Any>) -> Result<ErasedRef> {
        let value = value.downcast::<T>().map_err(|_| PoolError::TypeMismatch {
            expected: type_name::<T>(),
            actual: UNNAMED_TYPE,
        })?;

        self.try_construct(*value).map(ErasedRef::new)
    }

    fn destroy_erased(&mut self, item: ErasedRef) -> Result<()> {
        self.try_destroy(item.downcast_for::<T>()?)
    }

    fn free_erased(&mut self, item: ErasedRef) -> Result<()> {
        self.try_free(item.downcast_for::<T>()?)
    }

    fn reset(&mut self) {
        Self::reset(self);
    }

    fn reset_with_capacity(&mut self, capacity: NonZero<usize>) {
        Self::reset_with_capacity(self, capacity);
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

    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(ErasedRef: Copy, Eq);
    assert_not_impl_any!(ErasedRef: Send, Sync);
    assert_impl_all!(TypedPool<u64>: Pool, SendPool);
    assert_impl_all!(TypedPool<Rc<u64>>: Pool);
    assert_not_impl_any!(TypedPool<Rc<u64>>: SendPool);

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn erased_round_trip_through_trait_object() {
        let mut pool: Box<dyn Pool> = Box::new(TypedPool::<u64>::new());

        assert_eq!(pool.item_type_name(), "u64");
        assert_eq!(pool.type_key(), TypeKey::of::<u64>());

        let item = pool.insert_erased(Box::new(99_u64)).unwrap();

        assert_eq!(item.type_key(), TypeKey::of::<u64>());
        assert_eq!(item.item_type_name(), "u64");
        assert!(item.downcast::<u32>().is_none());

        let typed = item.downcast::<u64>().unwrap();
        assert_eq!(unsafe { *typed.as_ref() }, 99);

        let concrete = pool.as_any().downcast_ref::<TypedPool<u64>>().unwrap();
        assert!(concrete.contains(typed));

        pool.destroy_erased(item).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn insert_of_wrong_type_is_rejected() {
        let mut pool = TypedPool::<u64>::new();

        let result = Pool::insert_erased(&mut pool, Box::new("text"));

        assert_eq!(
            result,
            Err(PoolError::TypeMismatch {
                expected: "u64",
                actual: UNNAMED_TYPE,
            })
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn erased_ref_of_other_type_is_rejected() {
        let mut strings = TypedPool::<String>::new();
        let mut numbers = TypedPool::<u64>::new();

        let item = Pool::insert_erased(&mut strings, Box::new("x".to_string())).unwrap();

        assert_eq!(
            Pool::destroy_erased(&mut numbers, item),
            Err(PoolError::TypeMismatch {
                expected: "u64",
                actual: type_name::<String>(),
            })
        );
        assert!(Pool::free_erased(&mut numbers, item).is_err());

        // Nothing happened to the value.
        assert_eq!(strings.len(), 1);
        Pool::destroy_erased(&mut strings, item).unwrap();
        assert!(strings.is_empty());
    }

    #[test]
    fn erased_free_does_not_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut pool: Box<dyn Pool> = Box::new(TypedPool::<Counted>::new());

        let item = pool
            .insert_erased(Box::new(Counted(Arc::clone(&drops))))
            .unwrap();

        let value = unsafe { item.downcast::<Counted>().unwrap().read() };
        pool.free_erased(item).unwrap();
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        drop(value);
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn erased_reset_and_clear() {
        let mut pool: Box<dyn Pool> = Box::new(TypedPool::<u32>::new());
        _ = pool.insert_erased(Box::new(1_u32)).unwrap();

        pool.reset_with_capacity(NonZero::new(4).unwrap());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.capacity(), 4);

        pool.clear();
        assert_eq!(pool.capacity(), 0);
        assert_eq!(
            pool.insert_erased(Box::new(2_u32)),
            Err(PoolError::Cleared { item_type: "u32" })
        );

        pool.reset();
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn pools_of_thread_bound_values_are_erasable() {
        let mut pools: Vec<Box<dyn Pool>> = vec![
            <dyn Pool as ErasedPool<Rc<u32>>>::erase(TypedPool::new()),
            Box::new(TypedPool::<u32>::new()),
        ];

        let shared = Rc::new(5_u32);
        let item = pools[0].insert_erased(Box::new(Rc::clone(&shared))).unwrap();

        assert_eq!(Rc::strong_count(&shared), 2);
        assert_eq!(item.type_key(), TypeKey::of::<Rc<u32>>());

        pools[0].destroy_erased(item).unwrap();
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn send_pools_erase_as_send() {
        let pool = <dyn SendPool as ErasedPool<String>>::erase(TypedPool::new());

        let pool = std::thread::spawn(move || {
            let mut pool = pool;
            _ = pool.insert_erased(Box::new("moved".to_string())).unwrap();
            pool
        })
        .join()
        .unwrap();

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.item_type_name(), type_name::<String>());
    }

    #[test]
    fn into_any_recovers_concrete_pool() {
        let pool: Box<dyn Pool> = Box::new(TypedPool::<u8>::new());

        let concrete = pool.into_any().downcast::<TypedPool<u8>>().unwrap();
        assert_eq!(concrete.capacity(), 12);
    }
}
