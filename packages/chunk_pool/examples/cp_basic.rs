//! Basic usage of the `chunk_pool` crate:
//!
//! * Creating a pool.
//! * Constructing values and using the pointers the pool returns.
//! * Destroying values and watching the pool recycle their slots.
//! * Growing the pool beyond its first chunk.

use std::num::NonZero;

use chunk_pool::{DropPolicy, TypedPool};

#[derive(Debug)]
struct Particle {
    position: (f32, f32),
    velocity: (f32, f32),
}

fn main() {
    let mut pool = TypedPool::<Particle>::builder()
        .initial_capacity(NonZero::new(4).unwrap())
        .drop_policy(DropPolicy::MustNotDropItems)
        .build();

    // Constructing a value gives you a pointer that stays valid until you destroy the value.
    let first = pool.construct(Particle {
        position: (0.0, 0.0),
        velocity: (1.0, 0.5),
    });

    let mut others = (0..6_u8)
        .map(|index| {
            pool.construct(Particle {
                position: (f32::from(index), 0.0),
                velocity: (0.0, 1.0),
            })
        })
        .collect::<Vec<_>>();

    // Seven values do not fit into the first chunk of four, so a second chunk of eight was added.
    println!(
        "Pool holds {} values in {} chunks with a total capacity of {}",
        pool.len(),
        pool.chunk_count(),
        pool.capacity()
    );

    // Values never move, so the pointer is still good after the pool grew.
    // SAFETY: The value is live and no other reference to it exists.
    let particle = unsafe { first.as_ref() };
    println!("First particle: {particle:?}");

    for particle in pool.iter_mut() {
        particle.position.0 += particle.velocity.0;
        particle.position.1 += particle.velocity.1;
    }

    // Destroyed slots are reused before the pool touches fresh memory.
    let recycled_address = others.pop().unwrap();
    pool.destroy(recycled_address);

    let replacement = pool.construct(Particle {
        position: (9.0, 9.0),
        velocity: (0.0, 0.0),
    });
    println!(
        "Replacement reused the vacated slot: {}",
        replacement == recycled_address
    );

    // With `MustNotDropItems`, dropping a pool that still holds values panics, so clean up.
    pool.destroy(first);
    pool.destroy(replacement);
    for ptr in others {
        pool.destroy(ptr);
    }

    println!("Pool is empty: {}", pool.is_empty());
}
