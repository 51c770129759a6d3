//! # Arena
//!
//! A bump allocator over one contiguous buffer. Allocations are freed all at
//! once when the arena is reset or dropped.

// SAFETY: The arena owns a raw buffer and hands out pointers into it.
// Every unsafe block below documents the invariant it relies on.
#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{ArenaError, ArenaResult};

/// Alignment of the backing buffer (one cache line).
pub const ARENA_BASE_ALIGN: usize = 64;

/// A bump-pointer arena.
///
/// Allocation only advances an offset. Nothing is freed individually:
/// memory comes back through [`Arena::reset`] or when the arena is dropped.
///
/// `reset` takes `&mut self`, so while any [`ArenaAllocator`] or table
/// borrows the arena the compiler refuses to reset or drop it.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Use one arena per thread.
///
/// # Example
///
/// ```rust
/// use stratakv_core::Arena;
///
/// let mut arena = Arena::new(1024 * 1024).unwrap();
/// let ptr = arena.allocate(256, 16).unwrap();
/// assert_eq!(ptr.as_ptr() as usize % 16, 0);
///
/// arena.reset();
/// assert_eq!(arena.used(), 0);
/// ```
///
/// Resetting while a table still uses the memory does not compile:
///
/// ```compile_fail
/// use stratakv_core::{Arena, ArenaAllocator, FlatTable};
///
/// let mut arena = Arena::new(1 << 16).unwrap();
/// let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
/// let mut table: FlatTable<'_, u64, u64> = FlatTable::new(64, alloc, 2).unwrap();
/// arena.reset();
/// let _ = table.insert(1, 1);
/// ```
///
/// [`ArenaAllocator`]: crate::ArenaAllocator
pub struct Arena {
    /// Start of the backing buffer.
    base: NonNull<u8>,
    /// Layout the buffer was allocated with.
    layout: Layout,
    /// Current bump offset from `base`.
    offset: Cell<usize>,
    /// Successful allocations since construction or the last reset.
    allocations: Cell<usize>,
}

impl Arena {
    /// Creates a new arena with the specified capacity in bytes.
    ///
    /// The buffer is zero-filled and aligned to [`ARENA_BASE_ALIGN`].
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Construction`] if `bytes` is zero, exceeds the
    /// maximum layout size, or the system allocator refuses the request.
    pub fn new(bytes: usize) -> ArenaResult<Self> {
        if bytes == 0 {
            return Err(ArenaError::Construction { bytes });
        }
        let layout = Layout::from_size_align(bytes, ARENA_BASE_ALIGN)
            .map_err(|_| ArenaError::Construction { bytes })?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(ArenaError::Construction { bytes })?;

        tracing::debug!(bytes, "arena created");

        Ok(Self {
            base,
            layout,
            offset: Cell::new(0),
            allocations: Cell::new(0),
        })
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Returns the current used space in bytes, padding included.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Returns the number of successful allocations since the last reset.
    #[inline]
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Carves `size` bytes aligned to `align` from the remaining space.
    ///
    /// This is an **O(1)** operation. On failure the bump offset is left
    /// untouched and no previously issued region is modified.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::InvalidAlignment`] if `align` is not a power of two.
    /// - [`ArenaError::Exhausted`] if the aligned request does not fit.
    pub fn allocate(&self, size: usize, align: usize) -> ArenaResult<NonNull<u8>> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }

        let offset = self.offset.get();
        let remaining = self.capacity() - offset;

        // Align the absolute address so requests above ARENA_BASE_ALIGN work.
        let cursor = self.base.as_ptr() as usize + offset;
        let padding = cursor.wrapping_neg() & (align - 1);
        let requested = padding.checked_add(size).ok_or(ArenaError::Exhausted {
            requested: usize::MAX,
            remaining,
        })?;
        if requested > remaining {
            return Err(ArenaError::Exhausted {
                requested,
                remaining,
            });
        }

        self.offset.set(offset + requested);
        self.allocations.set(self.allocations.get() + 1);

        // SAFETY: `offset + padding <= offset + requested <= capacity`, so the
        // pointer stays inside (or one past the end of) the buffer.
        let ptr = unsafe { self.base.as_ptr().add(offset + padding) };
        // SAFETY: derived from a non-null base with an in-bounds offset.
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Rewinds the arena, invalidating every allocation.
    ///
    /// This is a **zero-cost** operation - no memory is freed or reallocated.
    /// Taking `&mut self` guarantees no borrower of the arena is still alive.
    #[inline]
    pub fn reset(&mut self) {
        tracing::trace!(used = self.used(), "arena reset");
        self.offset.set(0);
        self.allocations.set(0);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated in `new` with exactly this layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

// SAFETY: The arena exclusively owns its buffer; moving it to another thread
// moves that ownership. It is not Sync because the offset lives in a Cell.
unsafe impl Send for Arena {}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("allocations", &self.allocations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocation() {
        let arena = Arena::new(1024).unwrap();
        let ptr = arena.allocate(40, 4).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4, 0);
        assert_eq!(arena.used(), 40);
        assert_eq!(arena.allocations(), 1);
    }

    #[test]
    fn test_arena_reset() {
        let mut arena = Arena::new(1024).unwrap();
        let _ = arena.allocate(100, 8).unwrap();
        assert!(arena.used() > 0);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.remaining(), 1024);
        assert_eq!(arena.allocations(), 0);
    }

    #[test]
    fn test_arena_zero_size_rejected() {
        assert_eq!(
            Arena::new(0).unwrap_err(),
            ArenaError::Construction { bytes: 0 }
        );
    }

    #[test]
    fn test_arena_alignment_padding() {
        let arena = Arena::new(1024).unwrap();
        let _ = arena.allocate(1, 1).unwrap();
        let ptr = arena.allocate(8, 8).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        // 1 byte + 7 bytes padding + 8 bytes.
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn test_arena_alignment_above_base() {
        let arena = Arena::new(4096).unwrap();
        let _ = arena.allocate(3, 1).unwrap();
        let ptr = arena.allocate(16, 256).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 256, 0);
    }

    #[test]
    fn test_arena_invalid_alignment() {
        let arena = Arena::new(64).unwrap();
        assert_eq!(
            arena.allocate(8, 3).unwrap_err(),
            ArenaError::InvalidAlignment(3)
        );
        assert_eq!(
            arena.allocate(8, 0).unwrap_err(),
            ArenaError::InvalidAlignment(0)
        );
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_arena_exhaustion_leaves_offset() {
        let arena = Arena::new(128).unwrap();
        let _ = arena.allocate(100, 1).unwrap();
        let err = arena.allocate(64, 1).unwrap_err();
        assert_eq!(
            err,
            ArenaError::Exhausted {
                requested: 64,
                remaining: 28
            }
        );
        assert_eq!(arena.used(), 100);
        assert_eq!(arena.allocations(), 1);
    }

    #[test]
    fn test_arena_exact_fit() {
        let arena = Arena::new(64).unwrap();
        let _ = arena.allocate(64, 1).unwrap();
        assert_eq!(arena.remaining(), 0);
        assert!(arena.allocate(1, 1).is_err());
        // Zero-sized requests still succeed at the end of the buffer.
        assert!(arena.allocate(0, 1).is_ok());
    }

    #[test]
    fn test_arena_huge_request() {
        let arena = Arena::new(64).unwrap();
        assert!(matches!(
            arena.allocate(usize::MAX, 8),
            Err(ArenaError::Exhausted { .. })
        ));
    }
}
