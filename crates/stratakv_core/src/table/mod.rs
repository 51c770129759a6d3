//! # Flat Table
//!
//! Fixed-capacity, open-addressing hash table with Swiss-table style control
//! bytes. All storage is carved from an [`Arena`](crate::Arena) once, at
//! construction.
//!
//! ## Layout
//!
//! ```text
//! ctrl:  [ g0: w bytes ][ g1: w bytes ] ... [ gN: w bytes ]   one byte per slot
//! slots: [ (K,V) ][ (K,V) ] ...                              capacity cells
//! ```
//!
//! Each control byte is EMPTY, DELETED, PADDING or a 7-bit fingerprint.
//! Lookups scan a whole group at once and stop at the first group that
//! contains an EMPTY lane.

mod flat;
pub mod group;
mod hash;
mod probe;

pub use flat::{FlatTable, InsertOutcome, Iter};
pub use group::{BitMask, GroupWidth};
pub use hash::SipBuildHasher;

/// Control byte values.
pub mod ctrl {
    /// Never used. Terminates probe sequences.
    pub const EMPTY: u8 = 0x80;
    /// Tombstone left by an erase. Probing continues past it.
    pub const DELETED: u8 = 0xFE;
    /// Lanes past the last slot when capacity is below the group width.
    /// Never claimable, never matches a fingerprint.
    pub const PADDING: u8 = 0xFF;

    /// Returns true for fingerprint bytes (OCCUPIED slots).
    #[inline]
    #[must_use]
    pub const fn is_full(byte: u8) -> bool {
        byte & 0x80 == 0
    }
}
