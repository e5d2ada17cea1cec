use thiserror::Error;

/// Contract violations detected by the fallible (`try_`) pool and handle operations.
///
/// The infallible counterparts of those operations panic with the same message.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolError {
    /// The handle was never issued, has been retired, or is the invalid sentinel.
    #[error("handle {handle} is not bound to a live value")]
    InvalidHandle {
        /// The rejected handle value.
        handle: u32,
    },

    /// The handle value is known, but the value it was issued for has since been destroyed.
    ///
    /// The handle value may even be bound again, to a newer value.
    #[error(
        "handle {handle} is stale: it was issued at generation {expected} but the slot is at generation {actual}"
    )]
    StaleHandle {
        /// The rejected handle value.
        handle: u32,

        /// Generation captured when the handle was issued.
        expected: u32,

        /// Current generation of the handle slot.
        actual: u32,
    },

    /// The handle was issued by a different pool.
    #[error("handle {handle} belongs to a different pool")]
    ForeignHandle {
        /// The rejected handle value.
        handle: u32,
    },

    /// The handle is not attached to any pool (e.g. it was created with `Default`).
    #[error("handle is not attached to a pool")]
    Detached,
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`PoolError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PoolError: Send, Sync, Debug);

    #[test]
    fn stale_message_names_generations() {
        let error = PoolError::StaleHandle {
            handle: 3,
            expected: 1,
            actual: 2,
        };

        assert_eq!(
            error.to_string(),
            "handle 3 is stale: it was issued at generation 1 but the slot is at generation 2"
        );
    }
}
