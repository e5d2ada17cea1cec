//! Integration tests for the `sparse_pool` package.
//!
//! These drive the public API end to end: raw handle tables with both backings, pools under long
//! create/destroy sequences and the handle objects layered on top.
#![allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use sparse_pool::{
    HashIndices, LocalSparsePool, OwnedHandle, PoolError, SparseHandles, SparseIndexMap,
    SparsePool,
};

struct Tracked {
    id: u32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Cheap deterministic pseudo-random sequence so failures are reproducible.
fn xorshift(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn reverse_map_holds<I: SparseIndexMap>(table: &SparseHandles<I>) {
    for (index, &handle) in table.handles().iter().enumerate() {
        assert_eq!(table.index_of(handle), Some(u32::try_from(index).unwrap()));
        assert_eq!(table.handle_at(u32::try_from(index).unwrap()), handle);
    }
}

fn table_random_walk<I: SparseIndexMap>() {
    let mut table = SparseHandles::<I>::with_backing();
    let mut live = Vec::new();
    let mut ever_issued = HashSet::new();
    let mut state = 0x9e37_79b9_u64;

    for _ in 0..3_000 {
        if xorshift(&mut state) % 3 != 0 || live.is_empty() {
            let handle = table.create();

            // The table itself never issues the same value twice.
            assert!(ever_issued.insert(handle));
            live.push(handle);
        } else {
            let position = usize::try_from(xorshift(&mut state)).unwrap() % live.len();
            let handle = live.swap_remove(position);

            let vacated = table.release(handle);
            assert!(vacated as usize <= table.len());
            assert!(!table.contains(handle));
        }

        assert_eq!(table.len(), live.len());
        reverse_map_holds(&table);
    }

    for handle in &live {
        assert!(table.contains(*handle));
    }
}

#[test]
fn table_random_walk_vector_backing() {
    table_random_walk::<sparse_pool::SparseIndices>();
}

#[test]
fn table_random_walk_hash_backing() {
    table_random_walk::<HashIndices>();
}

#[test]
fn releasing_last_entry_moves_nothing() {
    let mut table = SparseHandles::new();

    let a = table.create();
    let b = table.create();

    assert_eq!(table.release(b), 1);
    assert_eq!(table.index_of(a), Some(0));
    assert_eq!(table.len(), 1);

    assert_eq!(table.release(a), 0);
    assert!(table.is_empty());
}

#[test]
fn hash_backing_accepts_sparse_external_handles() {
    let mut table = SparseHandles::<HashIndices>::with_backing();

    let external = [7_u32, 4_000_000_000, 123_456];
    for handle in external {
        _ = table.add(handle);
    }

    let issued = table.create();
    assert!(!external.contains(&issued));

    assert_eq!(table.release(external[1]), 1);
    assert_eq!(table.index_of(issued), Some(1));
    reverse_map_holds(&table);
}

#[test]
fn try_release_unknown_handle_changes_nothing() {
    let mut table = SparseHandles::new();
    let a = table.create();

    assert_eq!(
        table.try_release(42),
        Err(PoolError::InvalidHandle { handle: 42 })
    );
    assert_eq!(table.index_of(a), Some(0));
}

#[test]
fn pool_values_follow_their_handles() {
    let drops = Rc::new(Cell::new(0));
    let mut pool = SparsePool::new();
    let mut live = Vec::new();
    let mut next_id = 0_u32;
    let mut state = 0x1234_5678_u64;

    for _ in 0..2_000 {
        if xorshift(&mut state) % 5 < 3 || live.is_empty() {
            let handle = pool.insert(Tracked {
                id: next_id,
                drops: Rc::clone(&drops),
            });
            live.push((handle, next_id));
            next_id += 1;
        } else {
            let position = usize::try_from(xorshift(&mut state)).unwrap() % live.len();
            let (handle, id) = live.swap_remove(position);
            assert_eq!(pool.remove(handle).id, id);
        }

        assert_eq!(pool.len(), live.len());
    }

    for (handle, id) in &live {
        assert_eq!(pool.get(*handle).id, *id);
    }

    let seen = pool.iter().map(|(handle, _)| handle).collect::<HashSet<_>>();
    assert_eq!(seen.len(), live.len());

    let expected_drops = next_id as usize - live.len();
    assert_eq!(drops.get(), expected_drops);

    drop(pool);
    assert_eq!(drops.get(), next_id as usize);
}

#[test]
fn retired_handles_are_reused_last_in_first_out() {
    let mut pool = SparsePool::new();

    let handles = (0..5_u32).map(|value| pool.insert(value)).collect::<Vec<_>>();

    pool.destroy(handles[1]);
    pool.destroy(handles[3]);

    assert_eq!(pool.insert(10), handles[3]);
    assert_eq!(pool.insert(11), handles[1]);

    let fresh = pool.insert(12);
    assert!(!handles.contains(&fresh));
}

#[test]
fn swap_and_pop_invalidates_pointers_but_not_handles() {
    let mut pool = SparsePool::new();

    let first = pool.insert(String::from("first"));
    let middle = pool.insert(String::from("middle"));
    let last = pool.insert(String::from("last"));

    let last_address: *const String = pool.get(last);

    pool.destroy(first);

    // `last` now occupies the position `first` vacated.
    assert_ne!(last_address, pool.get(last) as *const String);
    assert_eq!(pool.values()[0], "last");
    assert_eq!(pool.get(last), "last");
    assert_eq!(pool.get(middle), "middle");
}

#[test]
fn raw_handle_resolves_to_new_occupant_but_handle_object_does_not() {
    let pool = LocalSparsePool::new();

    let old = pool.create(String::from("a"));
    let stale = old.as_handle();
    let raw = old.value();

    drop(old);

    let new = pool.create(String::from("c"));
    assert_eq!(new.value(), raw);

    // A raw value addresses whatever is bound now.
    let rewrapped = pool.handle(raw).unwrap();
    assert_eq!(*rewrapped.borrow(), "c");

    // The handle object captured the old generation.
    assert!(!stale.is_live());
    assert!(matches!(
        stale.try_borrow(),
        Err(PoolError::StaleHandle { .. })
    ));
}

#[test]
fn owned_handle_moves_destroy_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let pool = LocalSparsePool::new();

    let mut current = pool.create(Tracked {
        id: 0,
        drops: Rc::clone(&drops),
    });

    let mut holders: Vec<OwnedHandle<Tracked>> = Vec::new();

    for _ in 0..100 {
        let moved = current.take();
        holders.push(moved);
        current = holders.pop().unwrap();
    }

    assert_eq!(drops.get(), 0);
    assert_eq!(current.borrow().id, 0);

    drop(current);
    assert_eq!(drops.get(), 1);
    assert!(pool.is_empty());
}

#[test]
fn overwriting_owned_handle_destroys_only_the_target() {
    let drops = Rc::new(Cell::new(0));
    let pool = LocalSparsePool::new();

    let mut slots = (0..3)
        .map(|id| {
            pool.create(Tracked {
                id,
                drops: Rc::clone(&drops),
            })
        })
        .collect::<Vec<_>>();

    let replacement = pool.create(Tracked {
        id: 99,
        drops: Rc::clone(&drops),
    });

    slots[1] = replacement;

    assert_eq!(drops.get(), 1);
    assert_eq!(pool.len(), 3);
    assert_eq!(
        slots
            .iter()
            .map(|slot| slot.borrow().id)
            .collect::<Vec<_>>(),
        vec![0, 99, 2]
    );
}

#[test]
fn handles_outlive_the_last_pool_reference() {
    let drops = Rc::new(Cell::new(0));

    let owned = {
        let pool = LocalSparsePool::new();
        pool.create(Tracked {
            id: 5,
            drops: Rc::clone(&drops),
        })
    };

    assert_eq!(owned.borrow().id, 5);

    drop(owned);
    assert_eq!(drops.get(), 1);
}

#[test]
fn clear_through_shared_pool() {
    let pool = LocalSparsePool::new();

    let owned = (0..10_u32).map(|value| pool.create(value)).collect::<Vec<_>>();
    let weak = owned.iter().map(OwnedHandle::as_handle).collect::<Vec<_>>();

    pool.clear();

    assert!(pool.is_empty());
    assert!(weak.iter().all(|handle| !handle.is_live()));

    let fresh = pool.create(100);
    assert!(weak.iter().all(|handle| handle.value() != fresh.value()));

    drop(owned);
    assert_eq!(pool.len(), 1);
}

struct TreeNode {
    drops: Rc<Cell<usize>>,
    children: Vec<OwnedHandle<TreeNode>>,
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn owned_children_released_while_parent_is_mutated() {
    let drops = Rc::new(Cell::new(0));
    let pool = LocalSparsePool::new();

    let leaf = |drops: &Rc<Cell<usize>>| TreeNode {
        drops: Rc::clone(drops),
        children: Vec::new(),
    };

    let children = (0..4).map(|_| pool.create(leaf(&drops))).collect::<Vec<_>>();
    let weak = children.iter().map(OwnedHandle::as_handle).collect::<Vec<_>>();

    let root = pool.create(TreeNode {
        drops: Rc::clone(&drops),
        children,
    });

    pool.with_mut(&root.as_handle(), |node| {
        node.children.truncate(2);
    })
    .unwrap();

    assert_eq!(drops.get(), 2);
    assert_eq!(pool.len(), 3);

    root.borrow_mut().children.clear();

    assert!(weak.iter().all(|handle| !handle.is_live()));
    assert_eq!(pool.len(), 1);
    assert_eq!(drops.get(), 4);

    // Retired handles are reused without reaching the destroyed children.
    let reused = pool.create(leaf(&drops));
    assert!(weak.iter().any(|handle| handle.value() == reused.value()));
    assert!(weak.iter().all(|handle| !handle.is_live()));

    drop(root);
    drop(reused);
    assert_eq!(drops.get(), 6);
    assert!(pool.is_empty());
}
