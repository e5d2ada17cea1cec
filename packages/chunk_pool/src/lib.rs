//! Chunked object pools with stable addresses, usable with or without compile-time type knowledge.
//!
//! This package provides [`TypedPool`], a dynamically growing pool of values of one type that
//! hands out raw pointers which stay valid until the value is explicitly destroyed. Storage comes
//! from a chain of [`Chunk`]s, each a single allocation of fixed-size slots with a stack of vacant
//! slots. When a chunk runs out of slots, it gains a successor with double the capacity.
//!
//! # Features
//!
//! - **Stable addresses**: Values never move once constructed.
//! - **Fast recycling**: Released slots are reused before new memory is touched.
//! - **Type erasure**: Every [`TypedPool`] implements the object-safe [`Pool`] trait, which moves
//!   values in and out as `Box<dyn Any>` and type-tagged [`ErasedRef`] pointers.
//! - **Registries**: [`PoolRegistry`] keeps one pool per type, created on first access, and the
//!   [`global`] module offers a process-wide registry with explicit shutdown.
//! - **Contract checks**: Releasing a pointer the pool does not own, or releasing a slot twice,
//!   is detected before any state changes. The primary API panics, the `try_` twins return a
//!   [`PoolError`].
//! - **Optional leak detection**: A pool can be configured to panic on drop if values are still
//!   present ([`DropPolicy::MustNotDropItems`]).
//!
//! # Example
//!
//! ```rust
//! use chunk_pool::PoolRegistry;
//!
//! #[derive(Debug, PartialEq)]
//! struct Mesh {
//!     vertices: usize,
//! }
//!
//! let mut registry = PoolRegistry::new();
//!
//! let cube = registry.pool::<Mesh>().construct(Mesh { vertices: 8 });
//! let quad = registry.pool::<Mesh>().construct(Mesh { vertices: 4 });
//!
//! let pool = registry.pool::<Mesh>();
//! assert_eq!(pool.iter().map(|mesh| mesh.vertices).sum::<usize>(), 12);
//!
//! // SAFETY: The value is live and nothing else references it.
//! assert_eq!(unsafe { quad.as_ref() }, &Mesh { vertices: 4 });
//!
//! pool.destroy(cube);
//! pool.destroy(quad);
//! assert!(pool.is_empty());
//! ```
//!
//! # Thread safety
//!
//! Pools are thread-mobile ([`Send`] if the item type is) but not shareable between threads. A
//! [`PoolRegistry`] accepts any `'static` item type and stays on its thread, while a
//! [`SendPoolRegistry`] only accepts [`Send`] item types and can move. The [`global`] registry is
//! a [`SendPoolRegistry`] shared behind a mutex that serializes access.

mod builder;
mod chunk;
mod drop_policy;
mod erased;
mod error;
pub mod global;
mod registry;
mod type_key;
mod typed_pool;

pub use builder::*;
pub use chunk::*;
pub use drop_policy::*;
pub use erased::*;
pub use error::PoolError;
pub(crate) use error::Result;
pub use registry::*;
pub use type_key::*;
pub use typed_pool::*;
