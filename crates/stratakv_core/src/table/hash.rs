//! # Hashing
//!
//! Default hasher for [`FlatTable`](super::FlatTable) and the split of a
//! 64-bit hash into a home position and a 7-bit fingerprint.

use siphasher::sip::SipHasher13;
use std::hash::BuildHasher;

/// Fixed `SipHash` keys. Deterministic across runs and processes.
const DEFAULT_KEYS: (u64, u64) = (0x5354_5241_5441_4B56, 0x666C_6174_7461_626C);

/// [`BuildHasher`] producing keyed `SipHash-1-3` hashers.
///
/// Unlike `std`'s `RandomState` the keys are fixed unless chosen explicitly,
/// so probe layouts are reproducible between runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SipBuildHasher {
    k0: u64,
    k1: u64,
}

impl SipBuildHasher {
    /// Creates a builder with explicit `SipHash` keys.
    #[must_use]
    pub const fn with_keys(k0: u64, k1: u64) -> Self {
        Self { k0, k1 }
    }
}

impl Default for SipBuildHasher {
    fn default() -> Self {
        Self::with_keys(DEFAULT_KEYS.0, DEFAULT_KEYS.1)
    }
}

impl BuildHasher for SipBuildHasher {
    type Hasher = SipHasher13;

    #[inline]
    fn build_hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_keys(self.k0, self.k1)
    }
}

/// Position bits of a hash, masked by the caller.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn h1(hash: u64) -> usize {
    hash as usize
}

/// Top seven bits of a hash: the control-byte fingerprint.
///
/// Always `<= 0x7F`, so it can never collide with EMPTY, DELETED or PADDING.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn h2(hash: u64) -> u8 {
    (hash >> 57) as u8
}
