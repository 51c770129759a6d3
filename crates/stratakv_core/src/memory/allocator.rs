//! # Arena Allocator
//!
//! Typed, non-owning view over an [`Arena`].
//!
//! ## Deallocation is a no-op
//!
//! [`ArenaAllocator::deallocate`] does **nothing**. Memory handed out by this
//! allocator is never reused while the arena lives; it comes back only when
//! the whole arena is reset or dropped. That breaks the usual allocator
//! contract, which is why this is its own type and not a `GlobalAlloc` impl:
//! never plug it into code that expects freed memory to be recycled.

// SAFETY: Typed views over raw arena memory. Regions handed out by the arena
// never overlap and stay valid for the arena borrow `'a`.
#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use super::arena::Arena;
use crate::error::{ArenaError, ArenaResult};

/// A typed allocator that carves `T` arrays out of a borrowed [`Arena`].
///
/// The allocator is `Copy`: it only holds the arena reference. Two
/// allocators compare equal iff they refer to the same arena, regardless of
/// their element type.
///
/// # Example
///
/// ```rust
/// use stratakv_core::{Arena, ArenaAllocator};
///
/// let arena = Arena::new(4096).unwrap();
/// let alloc: ArenaAllocator<'_, u64> = ArenaAllocator::new(&arena);
///
/// let words = alloc.allocate_filled(16, 0u64).unwrap();
/// words[3] = 7;
/// assert_eq!(words.iter().sum::<u64>(), 7);
///
/// // Rebinding keeps the same arena.
/// let bytes = alloc.rebind::<u8>();
/// assert!(bytes == alloc);
/// ```
pub struct ArenaAllocator<'a, T> {
    /// The arena all requests are forwarded to.
    arena: &'a Arena,
    /// Element type; `fn() -> T` keeps the view covariant and independent of
    /// `T`'s auto traits.
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> ArenaAllocator<'a, T> {
    /// Creates an allocator over `arena`.
    #[inline]
    #[must_use]
    pub const fn new(arena: &'a Arena) -> Self {
        Self {
            arena,
            _marker: PhantomData,
        }
    }

    /// Returns the arena this allocator draws from.
    #[inline]
    #[must_use]
    pub const fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// Returns an allocator for another element type over the same arena.
    #[inline]
    #[must_use]
    pub const fn rebind<U>(&self) -> ArenaAllocator<'a, U> {
        ArenaAllocator::new(self.arena)
    }

    /// Reserves space for `count` values of `T`.
    ///
    /// The memory is uninitialized from the allocator's point of view (the
    /// arena zero-fills only on construction, not on reset).
    ///
    /// # Errors
    ///
    /// - [`ArenaError::LayoutOverflow`] if `count * size_of::<T>()` overflows.
    /// - [`ArenaError::Exhausted`] if the arena has no room left.
    pub fn allocate(&self, count: usize) -> ArenaResult<NonNull<T>> {
        let layout = Layout::array::<T>(count).map_err(|_| ArenaError::LayoutOverflow)?;
        let ptr = self.arena.allocate(layout.size(), layout.align())?;
        Ok(ptr.cast::<T>())
    }

    /// Does nothing.
    ///
    /// Arena memory is reclaimed only by [`Arena::reset`] or by dropping the
    /// arena. Calling this never makes space available again, and calling it
    /// twice on the same pointer is harmless.
    #[inline]
    pub fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        let _ = (ptr, count);
    }

    /// Reserves `count` uninitialized slots and returns them as a slice
    /// borrowed for the arena's lifetime.
    ///
    /// # Errors
    ///
    /// Same as [`ArenaAllocator::allocate`].
    pub fn allocate_uninit_slice(&self, count: usize) -> ArenaResult<&'a mut [MaybeUninit<T>]> {
        let ptr = self.allocate(count)?;
        // SAFETY: The arena returned a fresh, suitably aligned region of
        // `count * size_of::<T>()` bytes that no other slice aliases. The
        // region stays valid for `'a` because the arena cannot be reset or
        // dropped while borrowed. `MaybeUninit<T>` needs no initialization.
        Ok(unsafe {
            std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<MaybeUninit<T>>(), count)
        })
    }

    /// Reserves `count` slots and fills each with `value`.
    ///
    /// # Errors
    ///
    /// Same as [`ArenaAllocator::allocate`].
    pub fn allocate_filled(&self, count: usize, value: T) -> ArenaResult<&'a mut [T]>
    where
        T: Copy,
    {
        let slots = self.allocate_uninit_slice(count)?;
        for slot in slots.iter_mut() {
            slot.write(value);
        }
        // SAFETY: Every element was initialized by the loop above, and
        // `MaybeUninit<T>` has the same layout as `T`.
        Ok(unsafe { &mut *(slots as *mut [MaybeUninit<T>] as *mut [T]) })
    }
}

impl<T> Clone for ArenaAllocator<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaAllocator<'_, T> {}

impl<'a, T, U> PartialEq<ArenaAllocator<'a, U>> for ArenaAllocator<'a, T> {
    #[inline]
    fn eq(&self, other: &ArenaAllocator<'a, U>) -> bool {
        std::ptr::eq(self.arena, other.arena)
    }
}

impl<T> Eq for ArenaAllocator<'_, T> {}

impl<T> fmt::Debug for ArenaAllocator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("element", &std::any::type_name::<T>())
            .field("arena", &(self.arena as *const Arena))
            .finish()
    }
}
