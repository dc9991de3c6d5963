//! Error handling for the Basalt columnar block engine.
//!
//! Two failure families exist in the engine (see the block crate's contracts):
//! recoverable construction/value errors surface as [`BasaltResult`], while
//! contract violations (bad positions, misuse of the entry protocol) fail fast
//! through [`basalt_panic`].

use std::fmt::Display;

mod ext;

pub use ext::ResultExt;

/// The error type for all fallible Basalt operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BasaltError {
    /// A caller-supplied argument was malformed, e.g. mismatched buffer
    /// lengths or non-monotonic offsets.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An index, position, or region fell outside the addressable range.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// A value did not fit the declared width or precision of its column.
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
    /// Stored data violated a structural invariant, indicating upstream
    /// corruption (e.g. a duplicate key in a strict map).
    #[error("data integrity: {0}")]
    DataIntegrity(String),
    /// The operation is not supported by this block representation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Wrapper for a contextual message layered over another error.
    #[error("{0}: {1}")]
    Context(String, Box<BasaltError>),
}

impl BasaltError {
    /// Attach a contextual message to this error.
    pub fn with_context<S: Into<String>>(self, msg: S) -> Self {
        BasaltError::Context(msg.into(), Box::new(self))
    }
}

/// Result alias used across the Basalt crates.
pub type BasaltResult<T> = Result<T, BasaltError>;

/// Construct a [`BasaltError`], either from a variant name and format string
/// (`basalt_err!(OutOfBounds: "position {}", p)`) or from a bare format string
/// which defaults to `InvalidArgument`.
#[macro_export]
macro_rules! basalt_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::BasaltError::$variant(format!($fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::BasaltError::InvalidArgument(format!($fmt $(, $arg)*))
    };
}

/// Return early with a [`BasaltError`]; arguments as for [`basalt_err`].
#[macro_export]
macro_rules! basalt_bail {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::basalt_err!($variant: $fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::basalt_err!($fmt $(, $arg)*))
    };
}

/// Abort on a broken contract. This is the fail-fast path for programmer
/// errors and data-integrity violations that must not propagate silently.
#[macro_export]
macro_rules! basalt_panic {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err = $crate::basalt_err!($variant: $fmt $(, $arg)*);
        #[allow(clippy::panic)]
        {
            panic!("{err}")
        }
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err = $crate::basalt_err!($fmt $(, $arg)*);
        #[allow(clippy::panic)]
        {
            panic!("{err}")
        }
    }};
}

/// Unwrap a value that is structurally guaranteed to exist, panicking with a
/// descriptive message if the guarantee is broken.
pub trait BasaltExpect {
    type Output;

    fn basalt_expect(self, msg: &str) -> Self::Output;
}

impl<T> BasaltExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn basalt_expect(self, msg: &str) -> T {
        match self {
            Some(v) => v,
            None => basalt_panic!("expected Some: {}", msg),
        }
    }
}

impl<T, E: Display> BasaltExpect for Result<T, E> {
    type Output = T;

    #[inline(always)]
    fn basalt_expect(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => basalt_panic!("{}: {}", msg, e),
        }
    }
}

/// Unwrap a result whose error case is unreachable by construction.
pub trait BasaltUnwrap {
    type Output;

    fn basalt_unwrap(self) -> Self::Output;
}

impl<T, E: Display> BasaltUnwrap for Result<T, E> {
    type Output = T;

    #[inline(always)]
    fn basalt_unwrap(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => basalt_panic!("unwrapped an error: {}", e),
        }
    }
}
