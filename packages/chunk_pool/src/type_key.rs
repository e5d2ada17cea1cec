use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};

use foldhash::{HashMap, HashMapExt};

/// Keys handed out so far. The value is the index assigned to the type.
static TYPE_KEYS: LazyLock<Mutex<HashMap<TypeId, u32>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A process-wide stable integer identity of a Rust type.
///
/// Keys are assigned on first request, in increasing order, and are never reused for another
/// type during the lifetime of the process. Every [`PoolRegistry`][crate::PoolRegistry] (and the
/// process-wide registry) uses the same key space, so a key obtained anywhere can be used to look
/// up the pool of that type in any registry.
///
/// # Example
///
/// ```rust
/// use chunk_pool::TypeKey;
///
/// let a = TypeKey::of::<String>();
/// let b = TypeKey::of::<u64>();
///
/// assert_eq!(a, TypeKey::of::<String>());
/// assert_ne!(a, b);
/// ```
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeKey {
    index: u32,
}

impl TypeKey {
    /// Returns the key of `T`, assigning a new one if this is the first request for `T`.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` distinct types request a key.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::of_type_id(TypeId::of::<T>(), type_name::<T>())
    }

    /// The key of the type identified by `type_id`, whose name is `type_name`.
    pub(crate) fn of_type_id(type_id: TypeId, type_name: &'static str) -> Self {
        // Nothing panics while the lock is held except on OOM, so the table is always consistent.
        let mut keys = TYPE_KEYS.lock().unwrap_or_else(PoisonError::into_inner);

        let next_index = u32::try_from(keys.len())
            .unwrap_or_else(|_| panic!("type key space exhausted when assigning a key to {type_name}"));

        let index = *keys.entry(type_id).or_insert(next_index);

        Self { index }
    }

    /// The position of this key in the key space. Suitable for indexing a `Vec`.
    #[must_use]
    #[inline]
    pub fn index(self) -> usize {
        // u32 always fits in usize on the platforms we support.
        self.index as usize
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TypeKey: Send, Sync, Copy);

    #[test]
    fn same_type_same_key() {
        struct Local;

        assert_eq!(TypeKey::of::<Local>(), TypeKey::of::<Local>());
        assert_eq!(TypeKey::of::<Local>().index(), TypeKey::of::<Local>().index());
    }

    #[test]
    fn later_types_get_higher_keys() {
        struct First;
        struct Second;

        let first = TypeKey::of::<First>();
        let second = TypeKey::of::<Second>();

        assert!(second > first);
    }

    #[test]
    fn keys_are_shared_between_threads() {
        struct Shared;

        let here = TypeKey::of::<Shared>();
        let there = thread::spawn(TypeKey::of::<Shared>).join().unwrap();

        assert_eq!(here, there);
    }
}
