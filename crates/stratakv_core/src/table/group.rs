//! # Control Groups
//!
//! Pure functions that compare one byte against a group of control bytes
//! and report the matching lanes as a [`BitMask`].
//!
//! ```text
//! ctrl:  [ 0x12 | 0x80 | 0x12 | 0xFE | 0x33 | 0x80 | 0x80 | 0x7F ]
//! match_byte(0x12)          -> 0b0000_0101
//! match_empty               -> 0b0110_0010
//! match_empty_or_deleted    -> 0b0110_1010
//! ```
//!
//! The portable path works on 64-bit words (SWAR). On `x86_64` with SSE2 the
//! 16-byte chunks go through `_mm_cmpeq_epi8`. Both produce the same masks;
//! the table does not care which one ran.

// SAFETY: Only the SSE2 path uses unsafe, for unaligned 16-byte loads from
// 16-byte chunks of the group.
#![allow(unsafe_code)]

use super::ctrl;

/// Lanes per 64-bit control word.
const WORD_LANES: usize = 8;

/// Low seven bits of every byte.
const LOW_SEVEN: u64 = 0x7F7F_7F7F_7F7F_7F7F;

/// Lowest bit of every byte.
const LSB: u64 = 0x0101_0101_0101_0101;

/// High bit of every byte.
const MSB: u64 = 0x8080_8080_8080_8080;

/// Number of control bytes examined per probe step.
///
/// This is the table's tuning parameter, expressed as the number of 64-bit
/// control words scanned together. Wider groups cut the number of probe
/// steps at high load; narrower groups keep small tables cheap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GroupWidth {
    /// One word: 8 lanes.
    Narrow,
    /// Two words: 16 lanes, one SSE2 register.
    #[default]
    Standard,
    /// Four words: 32 lanes.
    Wide,
}

impl GroupWidth {
    /// Maps a control-word count (1, 2 or 4) to a width.
    #[must_use]
    pub const fn from_words(words: u32) -> Option<Self> {
        match words {
            1 => Some(Self::Narrow),
            2 => Some(Self::Standard),
            4 => Some(Self::Wide),
            _ => None,
        }
    }

    /// Returns the number of 64-bit control words per group.
    #[inline]
    #[must_use]
    pub const fn words(self) -> u32 {
        match self {
            Self::Narrow => 1,
            Self::Standard => 2,
            Self::Wide => 4,
        }
    }

    /// Returns the number of lanes (control bytes) per group.
    #[inline]
    #[must_use]
    pub const fn lanes(self) -> usize {
        self.words() as usize * WORD_LANES
    }
}

/// Set of matching lanes in one group. Bit `i` is lane `i`.
///
/// Iterate with `for lane in mask` to visit the lanes in ascending order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitMask(pub u32);

impl BitMask {
    /// Returns true if any lane matched.
    #[inline]
    #[must_use]
    pub const fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    /// Returns the lowest matching lane.
    #[inline]
    #[must_use]
    pub const fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }
}

impl IntoIterator for BitMask {
    type Item = usize;
    type IntoIter = Lanes;

    #[inline]
    fn into_iter(self) -> Lanes {
        Lanes(self.0)
    }
}

/// Iterator over the lanes of a [`BitMask`], lowest first.
#[derive(Clone, Debug)]
pub struct Lanes(u32);

impl Iterator for Lanes {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let lane = BitMask(self.0).lowest_set_bit()?;
        self.0 &= self.0 - 1;
        Some(lane)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Lanes {}

/// Lanes of `group` equal to `byte`.
///
/// `group.len()` must be a multiple of 8 and at most 32.
#[inline]
#[must_use]
pub fn match_byte(group: &[u8], byte: u8) -> BitMask {
    debug_assert!(group.len() % WORD_LANES == 0 && group.len() <= 32);

    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    {
        if group.len() % 16 == 0 {
            return sse2::match_byte(group, byte);
        }
    }

    swar::match_byte(group, byte)
}

/// Lanes holding [`ctrl::EMPTY`].
#[inline]
#[must_use]
pub fn match_empty(group: &[u8]) -> BitMask {
    match_byte(group, ctrl::EMPTY)
}

/// Lanes that an insert may claim: EMPTY or DELETED.
///
/// Single pass: the claimable bytes are exactly those with bit 7 set and
/// bit 0 clear. Fingerprints have bit 7 clear and PADDING has bit 0 set.
#[inline]
#[must_use]
pub fn match_empty_or_deleted(group: &[u8]) -> BitMask {
    debug_assert!(group.len() % WORD_LANES == 0 && group.len() <= 32);

    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    {
        if group.len() % 16 == 0 {
            return sse2::match_empty_or_deleted(group);
        }
    }

    swar::match_empty_or_deleted(group)
}

/// Portable SIMD-within-a-register matching.
pub(crate) mod swar {
    use super::{BitMask, LOW_SEVEN, LSB, MSB, WORD_LANES};

    /// Sets the high bit of exactly those bytes of `word` that are zero.
    #[inline]
    const fn zero_bytes(word: u64) -> u64 {
        // Adding 0x7F to the low seven bits carries into bit 7 for every
        // non-zero byte; OR-ing the original covers bytes with bit 7 set.
        // No carry crosses a byte boundary, so there are no false positives.
        !(((word & LOW_SEVEN).wrapping_add(LOW_SEVEN)) | word | LOW_SEVEN)
    }

    /// Compacts the per-byte high bits of `hits` into the low 8 bits.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn compact(hits: u64) -> u32 {
        let mut mask = 0u32;
        let mut lane = 0;
        while lane < WORD_LANES {
            mask |= (((hits >> (lane * 8 + 7)) & 1) as u32) << lane;
            lane += 1;
        }
        mask
    }

    /// Applies `hits` to each little-endian word of `group`.
    #[inline]
    fn scan(group: &[u8], hits: impl Fn(u64) -> u64) -> BitMask {
        let mut mask = 0u32;
        for (index, chunk) in group.chunks_exact(WORD_LANES).enumerate() {
            let mut raw = [0u8; WORD_LANES];
            raw.copy_from_slice(chunk);
            mask |= compact(hits(u64::from_le_bytes(raw))) << (index * WORD_LANES);
        }
        BitMask(mask)
    }

    /// Word-at-a-time version of [`super::match_byte`].
    #[must_use]
    pub(crate) fn match_byte(group: &[u8], byte: u8) -> BitMask {
        let pattern = LSB.wrapping_mul(u64::from(byte));
        scan(group, |word| zero_bytes(word ^ pattern))
    }

    /// Word-at-a-time version of [`super::match_empty_or_deleted`].
    #[must_use]
    pub(crate) fn match_empty_or_deleted(group: &[u8]) -> BitMask {
        // `word << 7` lifts each byte's bit 0 into its own bit 7.
        scan(group, |word| word & !(word << 7) & MSB)
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
mod sse2 {
    use super::BitMask;
    use std::arch::x86_64::{
        __m128i, _mm_andnot_si128, _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8,
        _mm_set1_epi8, _mm_slli_epi16,
    };

    /// 16 lanes per register.
    const LANES: usize = 16;

    /// SSE2 version of [`super::match_byte`] for groups of 16 or 32 lanes.
    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_ptr_alignment)]
    pub(super) fn match_byte(group: &[u8], byte: u8) -> BitMask {
        let needle = i8::from_ne_bytes([byte]);
        let mut mask = 0u32;
        for (index, chunk) in group.chunks_exact(LANES).enumerate() {
            // SAFETY: `chunk` is exactly 16 readable bytes; `loadu` has no
            // alignment requirement and SSE2 is enabled for this target.
            let bits = unsafe {
                let data = _mm_loadu_si128(chunk.as_ptr().cast::<__m128i>());
                _mm_movemask_epi8(_mm_cmpeq_epi8(data, _mm_set1_epi8(needle))) as u32
            };
            mask |= (bits & 0xFFFF) << (index * LANES);
        }
        BitMask(mask)
    }

    /// SSE2 version of [`super::match_empty_or_deleted`].
    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_ptr_alignment)]
    pub(super) fn match_empty_or_deleted(group: &[u8]) -> BitMask {
        let mut mask = 0u32;
        for (index, chunk) in group.chunks_exact(LANES).enumerate() {
            // SAFETY: as in `match_byte`.
            let bits = unsafe {
                let data = _mm_loadu_si128(chunk.as_ptr().cast::<__m128i>());
                // A 16-bit shift by 7 moves each byte's bit 0 into its own
                // bit 7; only bit 7 of each byte reaches the movemask.
                _mm_movemask_epi8(_mm_andnot_si128(_mm_slli_epi16::<7>(data), data)) as u32
            };
            mask |= (bits & 0xFFFF) << (index * LANES);
        }
        BitMask(mask)
    }
}
