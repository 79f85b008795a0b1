#![allow(clippy::module_name_repetitions)]

/// [`Error`] types of [`LazyCache`](super::LazyCache).
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error<E> {
    /// NullKey: the key handle does not refer to a live key.
    #[error("the key handle does not refer to a live key")]
    NullKey,
    /// Computation: the value computation failed; the key stays without a value.
    #[error("value computation failed: {0}")]
    Computation(E),
}

/// [`SignatureError`] types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SignatureError {
    /// MissingComponent: the component handle at the position does not refer to a live component.
    ///
    /// Position `0` is the return component, and the parameter at `i` is at position `i + 1`.
    #[error("component {index} is missing")]
    MissingComponent {
        /// The position of the missing component.
        index: usize,
    },
    /// IndexOutOfBounds: the parameter index is beyond the number of parameters.
    #[error("parameter index {index} is out of bounds for {len} parameters")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The number of parameters.
        len: usize,
    },
    /// InvalidRange: the parameter range is reversed or beyond the number of parameters.
    #[error("parameter range {start}..{end} is invalid for {len} parameters")]
    InvalidRange {
        /// The start of the range.
        start: usize,
        /// The end of the range.
        end: usize,
        /// The number of parameters.
        len: usize,
    },
}
