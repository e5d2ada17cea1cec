//! Shutdown of the process-wide registry.
//!
//! Lives in its own test binary because shutdown affects every user of the registry in the
//! process, and a single test keeps the sequence deterministic.
#![allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chunk_pool::global;

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn shutdown_drops_pools_and_registry_restarts_on_use() {
    // Nothing to shut down yet.
    global::shutdown_global_pools();
    assert_eq!(global::global_pool_count(), 0);

    let drops = Arc::new(AtomicUsize::new(0));

    let first = global::with_global_pool(|pool| pool.construct(Tracked(Arc::clone(&drops))));
    _ = global::with_global_pool(|pool| pool.construct(Tracked(Arc::clone(&drops))));
    _ = global::with_global_pool(|pool| pool.construct(7_u64));

    assert_eq!(global::global_pool_count(), 2);

    global::with_global_pool::<Tracked, _>(|pool| pool.destroy(first));
    assert_eq!(drops.load(Ordering::Relaxed), 1);

    global::shutdown_global_pools();

    // The value that was still live is dropped along with its pool.
    assert_eq!(drops.load(Ordering::Relaxed), 2);
    assert_eq!(global::global_pool_count(), 0);

    // A fresh registry is constructed on next use, with fresh pools.
    let count = global::with_global_pool::<Tracked, _>(|pool| pool.len());
    assert_eq!(count, 0);
    assert_eq!(global::global_pool_count(), 1);

    global::shutdown_global_pools();
    assert_eq!(global::global_pool_count(), 0);
}
