//! Keeping one pool per type in a registry:
//!
//! * Pools are created on first access.
//! * Values of types that cannot leave their thread are welcome in a `PoolRegistry`.
//! * Type-erased access through the `Pool` trait.
//! * The process-wide registry, which only accepts `Send` types.

use std::any::Any;
use std::rc::Rc;

use chunk_pool::{Pool, PoolRegistry, TypeKey, global};

#[derive(Debug)]
struct Texture {
    name: String,
}

#[derive(Debug)]
struct Material {
    texture: Rc<str>,
}

fn main() {
    let mut registry = PoolRegistry::new();

    let brick = registry.pool::<Texture>().construct(Texture {
        name: "brick".to_string(),
    });

    // `Rc` is not `Send`, which is fine for a registry that stays on this thread.
    let shared_name: Rc<str> = Rc::from("brick");
    let wall = registry.pool::<Material>().construct(Material {
        texture: Rc::clone(&shared_name),
    });

    println!("Registry holds {} pools", registry.len());

    for pool in registry.iter() {
        println!("{} pool holds {} values", pool.item_type_name(), pool.len());
    }

    // Without knowing the item type at compile time, values move in as `Box<dyn Any>`.
    let texture_pool = registry
        .pool_dyn_mut(TypeKey::of::<Texture>())
        .expect("the pool was created above");

    let boxed: Box<dyn Any> = Box::new(Texture {
        name: "marble".to_string(),
    });
    let marble = texture_pool.insert_erased(boxed).unwrap();
    println!("Inserted a {} through the erased interface", marble.item_type_name());

    // The erased reference knows its type and only converts back to the right one.
    let marble_ptr = marble.downcast::<Texture>().unwrap();
    // SAFETY: The value is live and no other reference to it exists.
    println!("Erased value: {:?}", unsafe { marble_ptr.as_ref() });
    assert!(marble.downcast::<Material>().is_none());

    let textures = registry.pool::<Texture>();
    textures.destroy(brick);
    textures.destroy(marble_ptr);

    registry.pool::<Material>().destroy(wall);
    println!("Name still shared by {} owners", Rc::strong_count(&shared_name));

    // The global registry is shared by every thread and requires `Send` item types.
    let total = std::thread::spawn(|| {
        global::with_global_pool::<u64, _>(|pool| {
            let a = pool.construct(40);
            let b = pool.construct(2);

            let total = pool.iter().sum::<u64>();

            pool.destroy(a);
            pool.destroy(b);
            total
        })
    })
    .join()
    .unwrap();

    println!("Global pool computed {total}");

    global::shutdown_global_pools();
    println!("Global pools after shutdown: {}", global::global_pool_count());
}
