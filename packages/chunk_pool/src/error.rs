use thiserror::Error;

/// Contract violations detected by the fallible (`try_`) pool operations.
///
/// The infallible counterparts of those operations panic with the same message.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolError {
    /// The pointer does not address a slot of any chunk in the pool's chunk chain.
    #[error("pointer {address:#x} does not belong to any chunk of the {item_type} pool")]
    ForeignPointer {
        /// Address of the rejected pointer.
        address: usize,

        /// Name of the type stored in the pool.
        item_type: &'static str,
    },

    /// The pointer addresses a slot that is not currently live.
    #[error("pointer {address:#x} refers to a slot that is already free in the {item_type} pool")]
    DoubleRelease {
        /// Address of the rejected pointer.
        address: usize,

        /// Name of the type stored in the pool.
        item_type: &'static str,
    },

    /// A type-erased value or reference was handed to a pool of a different type.
    #[error("pool of {expected} cannot accept an item of {actual}")]
    TypeMismatch {
        /// Name of the type stored in the pool.
        expected: &'static str,

        /// Description of the type that was offered.
        actual: &'static str,
    },

    /// The pool storage was released by `clear()` and the pool has not been reset since.
    #[error("the {item_type} pool has been cleared and must be reset before use")]
    Cleared {
        /// Name of the type stored in the pool.
        item_type: &'static str,
    },
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
    fn messages_name_the_item_type() {
        let error = PoolError::DoubleRelease {
            address: 0x1000,
            item_type: "u64",
        };

        assert_eq!(
            error.to_string(),
            "pointer 0x1000 refers to a slot that is already free in the u64 pool"
        );

        let error = PoolError::Cleared { item_type: "String" };
        assert!(error.to_string().contains("String"));
    }
}
