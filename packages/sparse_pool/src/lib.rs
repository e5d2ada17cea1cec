//! Dense object storage addressed through stable integer handles.
//!
//! Values live in one contiguous vector, so iterating over every live value is a plain slice walk.
//! Callers address values through `u32` handles instead of positions: a [`SparseHandles`] table
//! maps each handle to the current dense position of its value and back. Destroying a value moves
//! the last value into the gap and rebinds its handle, so creation, destruction and lookup are all
//! constant-time.
//!
//! # Layers
//!
//! - [`SparseHandles`] is the bare handle table. It is generic over its handle to dense index
//!   map ([`SparseIndices`] for dense handle spaces, [`HashIndices`] for large or externally
//!   supplied ones).
//! - [`SparsePool`] stores values next to a handle table and reuses retired handles first.
//! - [`LocalSparsePool`] shares a [`SparsePool`] through reference counting and hands out
//!   [`SparseHandle`] (weak, cloneable) and [`OwnedHandle`] (exclusive, destroys its value on drop)
//!   handle objects.
//!
//! # Example
//!
//! ```rust
//! use sparse_pool::LocalSparsePool;
//!
//! struct Light {
//!     intensity: f32,
//! }
//!
//! let lights = LocalSparsePool::new();
//!
//! let key = lights.create(Light { intensity: 1.0 });
//! let fill = lights.create(Light { intensity: 0.25 });
//!
//! let fill_ref = fill.as_handle();
//! fill_ref.borrow_mut().intensity = 0.5;
//!
//! drop(key);
//!
//! assert_eq!(lights.len(), 1);
//! assert_eq!(fill.borrow().intensity, 0.5);
//! ```
//!
//! # Stale handles
//!
//! Raw `u32` handles are reused once retired, and a retired raw handle resolves to whichever value
//! is bound to it next. The handle objects also record the generation of the handle slot, so a
//! [`SparseHandle`] or [`OwnedHandle`] whose value was destroyed never resolves to a newer value
//! that happens to reuse the same raw handle.
//!
//! # Thread safety
//!
//! [`SparseHandles`] and [`SparsePool`] are [`Send`] and [`Sync`] if the item type is.
//! [`LocalSparsePool`] and its handle objects are single-threaded.

mod builder;
mod error;
mod handle;
mod handles;
mod indices;
mod local_pool;
mod owned_handle;
mod pool;

pub use builder::*;
pub use error::PoolError;
pub(crate) use error::Result;
pub use handle::*;
pub use handles::*;
pub use indices::*;
pub use local_pool::*;
pub use owned_handle::*;
pub use pool::*;
