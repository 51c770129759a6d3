//! # Store Configuration
//!
//! Sizing and tuning knobs for one arena + table pair, loadable from TOML.
//!
//! ```toml
//! arena_bytes = 1048576
//! table_capacity = 1024
//! group_words = 2
//! rebuild_tombstone_ratio = 0.25
//! ```
//!
//! Configs are read once at startup; nothing here runs on the hot path.

use std::hash::Hash;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ArenaError, TableError, TableResult};
use crate::memory::{Arena, ArenaAllocator};
use crate::table::{FlatTable, GroupWidth};

/// Errors raised while loading or applying a [`StoreConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was malformed or had unknown fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Building the arena failed.
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Building the table failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Sizing and tuning for one arena + table pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Arena budget in bytes.
    pub arena_bytes: usize,
    /// Table capacity (rounded up to a power of two).
    pub table_capacity: usize,
    /// Probe-group width in 64-bit control words: 1, 2 or 4.
    pub group_words: u32,
    /// Tombstone share of the slots at which [`StoreConfig::maintain`]
    /// rebuilds the table.
    pub rebuild_tombstone_ratio: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            arena_bytes: 1 << 20,
            table_capacity: 1024,
            group_words: 2,
            rebuild_tombstone_ratio: 0.25,
        }
    }
}

impl StoreConfig {
    /// The measurement setup: 1 GiB arena, 16M slots, 8-lane groups.
    ///
    /// Benchmarks pre-fill half the table, keeping load at 50%.
    #[must_use]
    pub const fn benchmark() -> Self {
        Self {
            arena_bytes: 1 << 30,
            table_capacity: 1 << 24,
            group_words: 1,
            rebuild_tombstone_ratio: 0.25,
        }
    }

    /// A config whose arena holds a `capacity` table of `K -> V` twice over,
    /// leaving room for one same-size rebuild.
    ///
    /// # Errors
    ///
    /// [`TableError`] if the capacity is invalid or the size overflows.
    pub fn sized_for<K, V>(capacity: usize, width: GroupWidth) -> TableResult<Self>
    where
        K: Hash + Eq,
    {
        let bytes = FlatTable::<K, V>::required_bytes(capacity, width)?;
        let arena_bytes = bytes
            .checked_mul(2)
            .ok_or(TableError::InvalidCapacity(capacity))?;
        Ok(Self {
            arena_bytes,
            table_capacity: capacity,
            group_words: width.words(),
            ..Self::default()
        })
    }

    /// Parses a config from TOML text and validates it.
    ///
    /// Missing fields take their [`Default`] values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`], [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "store config loaded");
        Ok(config)
    }

    /// Renders the config as TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if rendering fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.arena_bytes == 0 {
            return Err(ConfigError::Invalid("arena_bytes must be non-zero".into()));
        }
        if self.table_capacity == 0 || self.table_capacity.checked_next_power_of_two().is_none() {
            return Err(ConfigError::Invalid(format!(
                "table_capacity {} cannot be rounded to a power of two",
                self.table_capacity
            )));
        }
        self.group_width()?;
        if !(self.rebuild_tombstone_ratio > 0.0 && self.rebuild_tombstone_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "rebuild_tombstone_ratio {} must be in (0, 1]",
                self.rebuild_tombstone_ratio
            )));
        }
        Ok(())
    }

    /// The probe-group width named by `group_words`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for anything but 1, 2 or 4.
    pub fn group_width(&self) -> ConfigResult<GroupWidth> {
        GroupWidth::from_words(self.group_words).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "group_words {} must be 1, 2 or 4",
                self.group_words
            ))
        })
    }

    /// Allocates the arena.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Arena`] if the buffer cannot be obtained.
    pub fn build_arena(&self) -> ConfigResult<Arena> {
        Ok(Arena::new(self.arena_bytes)?)
    }

    /// Builds a table over `arena` with the configured capacity and width.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for a bad width, [`ConfigError::Table`] if
    /// construction fails.
    pub fn build_table<'a, K, V>(&self, arena: &'a Arena) -> ConfigResult<FlatTable<'a, K, V>>
    where
        K: Hash + Eq,
    {
        let allocator: ArenaAllocator<'a, u8> = ArenaAllocator::new(arena);
        let table = FlatTable::new(self.table_capacity, allocator, self.group_width()?.words())?;
        Ok(table)
    }

    /// Rebuilds `table` at its current capacity if its tombstone ratio has
    /// reached [`StoreConfig::rebuild_tombstone_ratio`].
    ///
    /// Returns whether a rebuild happened.
    ///
    /// # Errors
    ///
    /// [`TableError::Arena`] if the arena cannot hold the fresh arrays.
    pub fn maintain<K, V, S>(&self, table: &mut FlatTable<'_, K, V, S>) -> TableResult<bool>
    where
        K: Hash + Eq,
        S: std::hash::BuildHasher,
    {
        if !table.needs_rebuild(self.rebuild_tombstone_ratio) {
            return Ok(false);
        }
        table.rebuild(table.capacity())?;
        Ok(true)
    }
}
