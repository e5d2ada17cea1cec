//! Basic usage of the `sparse_pool` crate:
//!
//! * Creating a pool with reserved capacity.
//! * Inserting values and addressing them through `u32` handles.
//! * Destroying values, which moves the last value into the gap.
//! * Iterating over every value as one contiguous slice.

use sparse_pool::SparsePool;

#[derive(Debug)]
struct Body {
    name: &'static str,
    mass: f64,
}

fn main() {
    let mut pool = SparsePool::<Body>::builder().capacity(16).build();

    // Inserting a value gives you a handle that keeps addressing it wherever it moves.
    let sun = pool.insert(Body {
        name: "sun",
        mass: 1.989e30,
    });
    let comet = pool.insert(Body {
        name: "comet",
        mass: 2.2e14,
    });
    let earth = pool.insert(Body {
        name: "earth",
        mass: 5.972e24,
    });

    println!(
        "Pool holds {} values with room for {} before reallocating",
        pool.len(),
        pool.capacity()
    );

    // Destroying the comet moves the earth into the vacated position.
    pool.destroy(comet);

    println!("Dense order after destroying the comet:");
    for body in pool.values() {
        println!("  {}", body.name);
    }

    // The handle of the moved value is still good.
    println!("Earth via its handle: {:?}", pool.get(earth));

    pool.get_mut(sun).mass *= 1.0001;

    let total_mass = pool.values().iter().map(|body| body.mass).sum::<f64>();
    println!("Total mass: {total_mass:e}");

    // A retired handle is handed out again for the next value.
    let moon = pool.insert(Body {
        name: "moon",
        mass: 7.342e22,
    });
    println!("Moon reuses the comet's handle: {}", moon == comet);

    for (handle, body) in pool.iter() {
        println!("  handle {handle} -> {}", body.name);
    }
}
