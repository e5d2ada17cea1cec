/// Determines item dropping behavior when a chunk is dropped while it still holds live objects.
///
/// By default, the chunk will drop its live objects when it is dropped.
///
/// # Examples
///
/// ```
/// use chunk_pool::{DropPolicy, TypedPool};
///
/// // The drop policy is set at pool creation time and applies to every chunk of the pool.
/// let pool = TypedPool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Live objects are dropped when the chunk holding them is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The chunk will panic if it still contains live objects when it is dropped.
    ///
    /// Useful when objects are referenced through raw pointers handed out by the pool and the
    /// owner wants a loud signal if the pool goes away before every object was returned.
    /// The memory is released before the panic is raised.
    MustNotDropItems,
}
