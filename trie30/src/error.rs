//! Error type for the map and its backing pool.
//!
//! There is exactly one failure kind the public API can return: the pool
//! could not satisfy an allocation (no page has a wide-enough free run, and
//! the global allocator could not supply a fresh page either). Everything
//! else (double-remove, removing an entry that was never inserted) is a
//! caller bug and is only checked via `debug_assert!` in debug builds.

use core::fmt;

/// Failure returned by allocation-driven map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The pool could not find or create a slot of the required width.
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory for trie slot allocation"),
        }
    }
}

impl core::error::Error for Error {}

/// Convenience result type for fallible map operations.
pub type Result<T = ()> = core::result::Result<T, Error>;
