//! # Memory Management
//!
//! The bump arena and its typed, non-owning allocator view.
//!
//! ## Design Philosophy
//!
//! All table memory is carved from one arena up front. Afterwards:
//! - No heap allocations
//! - No per-object frees
//! - Memory returns only through a whole-arena reset or drop

mod allocator;
mod arena;

pub use allocator::ArenaAllocator;
pub use arena::{Arena, ARENA_BASE_ALIGN};
