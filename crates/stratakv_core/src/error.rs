//! # Core Error Types
//!
//! All errors that can occur while building arenas and tables.
//!
//! A full table is deliberately absent here: `insert` reports it through
//! [`InsertOutcome::TableFull`](crate::InsertOutcome::TableFull) because it is
//! an expected result, not a failure of the call itself.

use thiserror::Error;

/// Errors raised by the bump arena and its typed allocator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    /// The backing buffer could not be obtained.
    #[error("arena construction failed for {bytes} bytes")]
    Construction {
        /// Requested buffer size.
        bytes: usize,
    },

    /// Not enough space left between the bump offset and the buffer end.
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted {
        /// Bytes requested, including alignment padding.
        requested: usize,
        /// Bytes still available before the request.
        remaining: usize,
    },

    /// Alignment was zero or not a power of two.
    #[error("invalid alignment: {0} is not a power of two")]
    InvalidAlignment(usize),

    /// `count * size_of::<T>()` overflowed `usize`.
    #[error("allocation size overflows usize")]
    LayoutOverflow,
}

/// Result type for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors raised while constructing or rebuilding a [`FlatTable`](crate::FlatTable).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Capacity was zero or cannot be rounded up to a power of two.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(usize),

    /// Tuning parameter is not a supported probe-group width.
    #[error("invalid group width: {0} control words (expected 1, 2 or 4)")]
    InvalidGroupWidth(u32),

    /// Rebuild target cannot hold the live entries.
    #[error("capacity {requested} cannot hold {len} live entries")]
    CapacityTooSmall {
        /// Normalized capacity that was requested.
        requested: usize,
        /// Live entries in the table.
        len: usize,
    },

    /// Backing storage could not be carved from the arena.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Result type for table construction and maintenance.
pub type TableResult<T> = Result<T, TableError>;
