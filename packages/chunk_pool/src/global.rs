//! The process-wide pool registry.
//!
//! The registry is constructed on first use and lives until [`shutdown_global_pools()`] is
//! called, which drops every pool in it (and every value still live in those pools) at a point
//! of the caller's choosing. Using the registry after shutdown constructs a fresh one.
//!
//! Access is serialized through a mutex. Callers on different threads can use the registry but
//! they take turns; values never move between threads unless the caller moves them.
//!
//! The registry is a [`SendPoolRegistry`], so only item types that are [`Send`] can be pooled in
//! it. It uses the same [`TypeKey`][crate::TypeKey] space as every [`PoolRegistry`] instance.
//!
//! [`PoolRegistry`]: crate::PoolRegistry
//!
//! # Example
//!
//! ```rust
//! use chunk_pool::global;
//!
//! struct Particle {
//!     energy: f32,
//! }
//!
//! let particle = global::with_global_pool(|pool| pool.construct(Particle { energy: 1.5 }));
//!
//! // SAFETY: The value is live and nothing else references it.
//! assert_eq!(unsafe { particle.as_ref() }.energy, 1.5);
//!
//! global::with_global_pool::<Particle, _>(|pool| pool.destroy(particle));
//!
//! // Drops every pool, releasing all memory held by the registry.
//! global::shutdown_global_pools();
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{SendPoolRegistry, TypedPool};

static GLOBAL_REGISTRY: Mutex<Option<SendPoolRegistry>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<SendPoolRegistry>> {
    // Every registry operation leaves the registry consistent before it can panic, so a panic
    // in a caller's closure does not invalidate the registry.
    GLOBAL_REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Calls `f` with the process-wide registry, constructing the registry on first use.
///
/// The registry is locked for the duration of the call. Calling any function of this module from
/// within `f` deadlocks.
pub fn with_global_registry<R>(f: impl FnOnce(&mut SendPoolRegistry) -> R) -> R {
    let mut guard = lock();

    let registry = guard.get_or_insert_with(|| {
        debug!("constructing process-wide pool registry");

        SendPoolRegistry::default()
    });

    f(registry)
}

/// Calls `f` with the process-wide pool for `T`, constructing the registry and the pool on first
/// use.
///
/// The registry is locked for the duration of the call. Calling any function of this module from
/// within `f` deadlocks.
///
/// # Panics
///
/// Panics if `T` is zero-sized.
pub fn with_global_pool<T: Send + 'static, R>(f: impl FnOnce(&mut TypedPool<T>) -> R) -> R {
    with_global_registry(|registry| f(registry.pool::<T>()))
}

/// Drops the process-wide registry along with every pool in it.
///
/// Values still live in the pools are dropped according to each pool's drop policy. Pointers
/// obtained from the pools become invalid. Does nothing if the registry was never constructed.
pub fn shutdown_global_pools() {
    // Taken out first, so that the pools are dropped without holding the lock.
    let registry = lock().take();

    if let Some(registry) = registry {
        debug!(
            pool_count = registry.len(),
            "shutting down process-wide pool registry"
        );

        drop(registry);
    }
}

/// The number of pools registered in the process-wide registry.
///
/// Zero if the registry has not been constructed or has been shut down.
#[must_use]
pub fn global_pool_count() -> usize {
    lock().as_ref().map_or(0, SendPoolRegistry::len)
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{PoolError, PoolRegistry, TypeKey};

    // Each test uses its own types because other tests may use the registry concurrently.
    // Shutdown is tested in a separate test binary for the same reason.

    #[test]
    fn pool_is_created_once_and_kept() {
        struct Marker(u32);

        let first = with_global_pool(|pool| pool.construct(Marker(1)));
        let second = with_global_pool(|pool| pool.construct(Marker(2)));

        with_global_pool::<Marker, _>(|pool| {
            assert_eq!(pool.len(), 2);
            assert_eq!(pool.iter().map(|marker| marker.0).sum::<u32>(), 3);
            assert!(pool.contains(first));
            assert!(pool.contains(second));

            pool.destroy(first);
            pool.destroy(second);
        });

        assert!(global_pool_count() >= 1);
    }

    #[test]
    fn shares_key_space_with_instances() {
        struct Shared(u8);

        let mut local = PoolRegistry::new();
        _ = local.pool::<Shared>().construct(Shared(1));

        let key = TypeKey::of::<Shared>();

        let global_key = with_global_registry(|registry| {
            _ = registry.pool::<Shared>();
            registry.pool_dyn(key).map(|pool| pool.type_key())
        });

        assert_eq!(global_key, Some(key));
        assert_eq!(local.pool_dyn(key).map(|pool| pool.len()), Some(1));
        assert_eq!(local.pool::<Shared>().iter().map(|shared| shared.0).sum::<u8>(), 1);
    }

    #[test]
    fn usable_from_other_threads() {
        struct Payload(u64);

        thread::spawn(|| {
            let ptr = with_global_pool(|pool| pool.construct(Payload(5)));
            assert_eq!(unsafe { ptr.as_ref() }.0, 5);
            with_global_pool::<Payload, _>(|pool| pool.destroy(ptr));
        })
        .join()
        .unwrap();

        with_global_pool::<Payload, _>(|pool| assert!(pool.is_empty()));
    }

    #[test]
    fn errors_surface_through_closure() {
        struct Lonely(u16);

        let ptr = with_global_pool(|pool| pool.construct(Lonely(1)));
        assert_eq!(unsafe { ptr.as_ref() }.0, 1);

        let first = with_global_pool::<Lonely, _>(|pool| pool.try_destroy(ptr));
        let second = with_global_pool::<Lonely, _>(|pool| pool.try_destroy(ptr));

        assert_eq!(first, Ok(()));
        assert!(matches!(second, Err(PoolError::DoubleRelease { .. })));
    }
}
