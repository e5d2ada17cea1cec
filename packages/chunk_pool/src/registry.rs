use std::any::{TypeId, type_name};
use std::fmt;
use std::num::NonZero;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::{ErasedPool, Pool, SendPool, TypeKey, TypedPool};

/// A set of [`TypedPool`]s, at most one per item type, looked up by type.
///
/// Pools are created on first access with the default configuration, or explicitly with a
/// custom capacity through [`create_pool()`][1]. The registry exclusively owns its pools;
/// dropping the registry drops every pool (and every value still live in them).
///
/// Pools are stored in a table indexed by [`TypeKey`], a key space shared by every registry in
/// the process (including the [process-wide registry][crate::global]), so a key obtained once can
/// be used to look up the pool of that type anywhere.
///
/// # Erased pool type
///
/// The registry stores its pools as `Box<P>`. The default, `dyn Pool`, accepts any `'static`
/// item type and keeps the registry on the thread that created it. [`SendPoolRegistry`] stores
/// `dyn SendPool` instead: it only accepts [`Send`] item types and can itself move between
/// threads.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use chunk_pool::PoolRegistry;
///
/// struct Widget {
///     id: u32,
/// }
///
/// let mut registry = PoolRegistry::new();
///
/// let widget = registry.pool::<Widget>().construct(Widget { id: 7 });
/// let name = registry.pool::<Rc<str>>().construct(Rc::from("seven"));
///
/// assert_eq!(registry.len(), 2);
/// assert!(registry.pool::<Widget>().contains(widget));
/// assert!(registry.pool::<Rc<str>>().contains(name));
///
/// // Sweep over every pool without knowing the types.
/// let live: usize = registry.iter().map(|pool| pool.len()).sum();
/// assert_eq!(live, 2);
/// ```
///
/// [1]: Self::create_pool
pub struct PoolRegistry<P: ?Sized = dyn Pool> {
    /// Indexed by `TypeKey::index()`. Only keys of registered types have a pool.
    pools: Vec<Option<Box<P>>>,

    /// Keys of the types this registry has seen, so lookups do not touch the process-wide table.
    keys: HashMap<TypeId, TypeKey>,
}

/// A [`PoolRegistry`] of pools that can move between threads, along with the registry itself.
pub type SendPoolRegistry = PoolRegistry<dyn SendPool>;

impl PoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: ?Sized + Pool> PoolRegistry<P> {
    /// Returns the pool for `T`, creating it with the default configuration on first access.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn pool<T: 'static>(&mut self) -> &mut TypedPool<T>
    where
        P: ErasedPool<T>,
    {
        let key = self.key_of::<T>();
        let slot = self.slot_mut(key);

        let pool = slot.get_or_insert_with(|| {
            debug!(item_type = type_name::<T>(), "registering typed pool");

            P::erase(TypedPool::<T>::new())
        });

        downcast_mut(&mut **pool)
    }

    /// Creates the pool for `T` with `capacity` slots in its first chunk, replacing any existing
    /// pool for `T`.
    ///
    /// The replaced pool is dropped, along with the values still live in it, according to its
    /// drop policy.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn create_pool<T: 'static>(&mut self, capacity: NonZero<usize>) -> &mut TypedPool<T>
    where
        P: ErasedPool<T>,
    {
        let key = self.key_of::<T>();
        let slot = self.slot_mut(key);

        debug!(
            item_type = type_name::<T>(),
            capacity = capacity.get(),
            replaced = slot.is_some(),
            "creating typed pool"
        );

        // The old pool goes first, so that we never hold two pools of the same type at once.
        *slot = None;
        let pool = slot.insert(P::erase(TypedPool::<T>::with_capacity(capacity)));

        downcast_mut(&mut **pool)
    }

    fn key_of<T: 'static>(&mut self) -> TypeKey {
        *self
            .keys
            .entry(TypeId::of::<T>())
            .or_insert_with(TypeKey::of::<T>)
    }

    /// The key of `T` if this registry has ever registered a pool for it.
    fn known_key_of<T: 'static>(&self) -> Option<TypeKey> {
        self.keys.get(&TypeId::of::<T>()).copied()
    }

    fn slot_mut(&mut self, key: TypeKey) -> &mut Option<Box<P>> {
        let index = key.index();

        if self.pools.len() <= index {
            self.pools.resize_with(index.wrapping_add(1), || None);
        }

        self.pools
            .get_mut(index)
            .expect("we just resized the table to include this index")
    }

    /// Returns the pool for `T` if one has been created.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&TypedPool<T>> {
        let pool = self.pool_dyn(self.known_key_of::<T>()?)?;

        Some(
            pool.as_any()
                .downcast_ref::<TypedPool<T>>()
                .expect("the pool registered for a type is always a TypedPool of that type"),
        )
    }

    /// Returns the pool for `T` if one has been created.
    #[must_use]
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut TypedPool<T>> {
        let key = self.known_key_of::<T>()?;
        self.pool_dyn_mut(key).map(downcast_mut::<T, P>)
    }

    /// Returns the pool registered under `key`, without knowing its type.
    #[must_use]
    pub fn pool_dyn(&self, key: TypeKey) -> Option<&P> {
        self.pools.get(key.index())?.as_deref()
    }

    /// Returns the pool registered under `key`, without knowing its type.
    #[must_use]
    pub fn pool_dyn_mut(&mut self, key: TypeKey) -> Option<&mut P> {
        self.pools.get_mut(key.index())?.as_deref_mut()
    }

    /// Unregisters the pool for `T` and hands it over to the caller.
    pub fn remove<T: 'static>(&mut self) -> Option<TypedPool<T>> {
        let key = self.known_key_of::<T>()?;
        let pool = self.pools.get_mut(key.index())?.take()?;

        debug!(item_type = type_name::<T>(), "unregistering typed pool");

        Some(
            *pool
                .into_any()
                .downcast::<TypedPool<T>>()
                .expect("the pool registered for a type is always a TypedPool of that type"),
        )
    }

    /// Drops every registered pool, releasing their storage.
    ///
    /// Values still live in the pools are dropped according to each pool's drop policy. Pools
    /// accessed after this are created anew.
    pub fn clear(&mut self) {
        debug!(pool_count = self.len(), "clearing pool registry");

        self.pools.clear();
    }

    /// Iterates over every registered pool.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.pools.iter().filter_map(Option::as_deref)
    }

    /// Iterates over every registered pool, allowing mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.pools.iter_mut().filter_map(Option::as_deref_mut)
    }

    /// The number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

fn downcast_mut<T: 'static, P: ?Sized + Pool>(pool: &mut P) -> &mut TypedPool<T> {
    pool.as_any_mut()
        .downcast_mut::<TypedPool<T>>()
        .expect("the pool registered for a type is always a TypedPool of that type")
}

impl<P: ?Sized> Default for PoolRegistry<P> {
    fn default() -> Self {
        Self {
            pools: Vec::new(),
            keys: HashMap::new(),
        }
    }
}

impl<P: ?Sized + Pool> fmt::Debug for PoolRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field(
                "pools",
                &self.iter().map(|pool| pool.item_type_name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::rc::Rc;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolRegistry: Default);
    assert_not_impl_any!(PoolRegistry: Send, Sync);
    assert_impl_all!(SendPoolRegistry: Send, Default);
    assert_not_impl_any!(SendPoolRegistry: Sync);

    struct Widget {
        id: u32,
    }

    #[test]
    fn lazily_created_pool_is_the_same_instance() {
        let mut registry = PoolRegistry::new();

        let first: *const TypedPool<Widget> = registry.pool::<Widget>();
        let second: *const TypedPool<Widget> = registry.pool::<Widget>();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn values_survive_repeated_lookup() {
        let mut registry = PoolRegistry::new();

        let widget = registry.pool::<Widget>().construct(Widget { id: 3 });

        assert!(registry.pool::<Widget>().contains(widget));
        assert_eq!(unsafe { widget.as_ref() }.id, 3);
        assert_eq!(registry.get::<Widget>().map(TypedPool::len), Some(1));
    }

    #[test]
    fn lazily_created_pool_has_default_capacity() {
        let mut registry = PoolRegistry::new();

        assert_eq!(registry.pool::<u128>().capacity(), 12);
    }

    #[test]
    fn create_pool_replaces_existing() {
        let mut registry = PoolRegistry::new();

        _ = registry.pool::<Widget>().construct(Widget { id: 1 });

        let pool = registry.create_pool::<Widget>(NonZero::new(64).unwrap());

        assert_eq!(pool.capacity(), 64);
        assert!(pool.is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pool::<Widget>().capacity(), 64);
    }

    #[test]
    fn get_does_not_create() {
        let mut registry = PoolRegistry::new();

        assert!(registry.get::<Widget>().is_none());
        assert!(registry.get_mut::<Widget>().is_none());
        assert!(registry.is_empty());

        _ = registry.pool::<Widget>();

        assert!(registry.get::<Widget>().is_some());
        assert!(registry.get_mut::<Widget>().is_some());
    }

    #[test]
    fn dyn_lookup_by_key() {
        let mut registry = PoolRegistry::new();
        _ = registry.pool::<Widget>().construct(Widget { id: 1 });

        let key = TypeKey::of::<Widget>();

        let pool = registry.pool_dyn(key).unwrap();
        assert_eq!(pool.type_key(), key);
        assert_eq!(pool.len(), 1);

        registry.pool_dyn_mut(key).unwrap().clear();
        assert!(registry.get::<Widget>().unwrap().is_cleared());

        assert!(registry.pool_dyn(TypeKey::of::<i8>()).is_none());
    }

    #[test]
    fn remove_hands_over_pool() {
        let mut registry = PoolRegistry::new();
        let widget = registry.pool::<Widget>().construct(Widget { id: 9 });

        let pool = registry.remove::<Widget>().unwrap();

        assert!(pool.contains(widget));
        assert!(registry.is_empty());
        assert!(registry.remove::<Widget>().is_none());
    }

    #[test]
    fn clear_drops_all_pools() {
        let mut registry = PoolRegistry::new();
        _ = registry.pool::<Widget>().construct(Widget { id: 1 });
        _ = registry.pool::<String>().construct("x".to_string());

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.pool::<Widget>().is_empty());
    }

    #[test]
    fn sweep_over_heterogeneous_pools() {
        let mut registry = PoolRegistry::new();
        _ = registry.pool::<Widget>().construct(Widget { id: 1 });
        _ = registry.pool::<String>().construct("x".to_string());
        _ = registry.pool::<String>().construct("y".to_string());

        let mut names = registry
            .iter()
            .map(|pool| (pool.item_type_name(), pool.len()))
            .collect::<Vec<_>>();
        names.sort_unstable();

        assert_eq!(names.len(), 2);
        assert!(names.contains(&(type_name::<String>(), 2)));

        for pool in registry.iter_mut() {
            pool.reset();
        }

        assert!(registry.iter().all(|pool| pool.is_empty()));
    }

    #[test]
    fn debug_lists_item_types() {
        let mut registry = PoolRegistry::new();
        _ = registry.pool::<Widget>();

        assert!(format!("{registry:?}").contains("Widget"));
    }

    #[test]
    fn instance_registry_accepts_thread_bound_types() {
        struct Node {
            parent: Option<Rc<Node>>,
        }

        let root = Rc::new(Node { parent: None });

        let mut registry = PoolRegistry::new();
        let child = registry.pool::<Rc<Node>>().construct(Rc::new(Node {
            parent: Some(Rc::clone(&root)),
        }));

        assert_eq!(Rc::strong_count(&root), 2);
        assert!(unsafe { child.as_ref() }.parent.is_some());
        assert_eq!(registry.get::<Rc<Node>>().map(TypedPool::len), Some(1));

        registry.clear();
        assert_eq!(Rc::strong_count(&root), 1);
    }

    #[test]
    fn send_registry_moves_between_threads() {
        let mut registry = SendPoolRegistry::default();
        _ = registry.pool::<Widget>().construct(Widget { id: 4 });

        let registry = thread::spawn(move || {
            let mut registry = registry;
            _ = registry.pool::<Widget>().construct(Widget { id: 5 });
            registry
        })
        .join()
        .unwrap();

        let ids = registry
            .get::<Widget>()
            .unwrap()
            .iter()
            .map(|widget| widget.id)
            .sum::<u32>();
        assert_eq!(ids, 9);
    }

    #[test]
    fn lookups_agree_with_process_wide_keys() {
        let mut registry = PoolRegistry::new();

        // Not registered here yet, so lookups by type find nothing.
        assert!(registry.get::<i16>().is_none());
        assert!(registry.remove::<i16>().is_none());

        _ = registry.pool::<i16>().construct(-1);

        let key = TypeKey::of::<i16>();
        assert_eq!(registry.pool_dyn(key).map(|pool| pool.type_key()), Some(key));

        // Keys stay known across a clear.
        registry.clear();
        assert!(registry.get::<i16>().is_none());
        assert_eq!(registry.pool::<i16>().len(), 0);
        assert!(registry.pool_dyn(key).is_some());
    }
}
