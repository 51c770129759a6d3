//! # STRATAKV Core
//!
//! Arena-backed storage primitive for a key-value store:
//! - A bump [`Arena`] that owns one buffer and never frees individually
//! - A typed, non-owning [`ArenaAllocator`] view over it
//! - A fixed-capacity Swiss-table style [`FlatTable`] carved from the arena
//!
//! ## Architecture Rules
//!
//! 1. **Allocate once** - Table memory comes from the arena at construction
//! 2. **No hidden work** - insert/find/erase never allocate, log or resize
//! 3. **Borrow, don't own** - Allocators and tables borrow the arena, so the
//!    compiler rejects resetting or dropping it while they are alive
//!
//! ## Example
//!
//! ```rust
//! use stratakv_core::{Arena, ArenaAllocator, FlatTable, InsertOutcome};
//!
//! let arena = Arena::new(1 << 20).unwrap();
//! let alloc: ArenaAllocator<'_, u64> = ArenaAllocator::new(&arena);
//! let mut table: FlatTable<'_, u64, u64> = FlatTable::new(1024, alloc, 1).unwrap();
//!
//! assert_eq!(table.insert(5, 50), InsertOutcome::Inserted);
//! assert_eq!(table.get(&5), Some(&50));
//! assert!(table.erase(&5));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod table;

pub use config::{ConfigError, StoreConfig};
pub use error::{ArenaError, ArenaResult, TableError, TableResult};
pub use memory::{Arena, ArenaAllocator};
pub use table::{BitMask, FlatTable, GroupWidth, InsertOutcome, SipBuildHasher};
