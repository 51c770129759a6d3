//! # Flat Table
//!
//! The table itself: hashing, group probing, insert, find, erase and the
//! explicit tombstone maintenance operations.
//!
//! ## Performance
//!
//! - insert / find / erase: O(1) expected, no allocation
//! - miss: stops at the first probed group holding an EMPTY lane
//! - rebuild: O(capacity), one arena allocation per array

// SAFETY: Slots are `MaybeUninit`; a slot is initialized iff its control
// byte is a fingerprint. Every unsafe block relies on that invariant.
#![allow(unsafe_code)]

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};

use super::ctrl;
use super::group::{self, GroupWidth};
use super::hash::{h1, h2, SipBuildHasher};
use super::probe::ProbeSeq;
use crate::error::{TableError, TableResult};
use crate::memory::ArenaAllocator;

/// Result of [`FlatTable::insert`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsertOutcome {
    /// The key was absent and now maps to the given value.
    Inserted,
    /// The key was already present. The stored value is unchanged and the
    /// rejected key and value were dropped.
    AlreadyPresent,
    /// No claimable slot on the probe path. Nothing was written.
    TableFull,
}

impl InsertOutcome {
    /// Returns true for [`InsertOutcome::Inserted`].
    #[inline]
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Fixed-capacity open-addressing hash table living in arena memory.
///
/// Insert is insert-or-fail: an existing key keeps its value and the call
/// returns [`InsertOutcome::AlreadyPresent`]. Use [`FlatTable::get_mut`] to
/// update in place.
///
/// The table never grows by itself. When [`FlatTable::insert`] reports
/// [`InsertOutcome::TableFull`], or erases have left too many tombstones,
/// call [`FlatTable::rebuild`].
///
/// # Thread Safety
///
/// Not thread-safe, and not `Send`: the arena it borrows is single-threaded.
/// Shard with one arena and one table per thread.
///
/// # Example
///
/// ```rust
/// use stratakv_core::{Arena, ArenaAllocator, FlatTable, InsertOutcome};
///
/// let arena = Arena::new(1 << 20).unwrap();
/// let alloc: ArenaAllocator<'_, u64> = ArenaAllocator::new(&arena);
/// let mut table: FlatTable<'_, u64, u64> = FlatTable::new(1024, alloc, 2).unwrap();
///
/// assert_eq!(table.insert(5, 50), InsertOutcome::Inserted);
/// assert_eq!(table.insert(5, 99), InsertOutcome::AlreadyPresent);
///
/// let mut out = 0;
/// assert!(table.find(&5, &mut out));
/// assert_eq!(out, 50);
/// ```
pub struct FlatTable<'a, K, V, S = SipBuildHasher> {
    /// One control byte per slot, padded up to one full group.
    ctrl: &'a mut [u8],
    /// Entry storage. Slot `i` is initialized iff `ctrl[i]` is a fingerprint.
    slots: &'a mut [MaybeUninit<(K, V)>],
    /// `group_count - 1`.
    group_mask: usize,
    /// Probe-group width.
    width: GroupWidth,
    /// OCCUPIED slots.
    len: usize,
    /// DELETED slots.
    tombstones: usize,
    /// Source of the arrays; reused by `rebuild`.
    allocator: ArenaAllocator<'a, u8>,
    /// Hash builder.
    hasher: S,
    /// The table owns its keys and values for drop-check purposes.
    _owns: PhantomData<(K, V)>,
}

/// Rounds `requested` up to a power of two.
fn normalize_capacity(requested: usize) -> TableResult<usize> {
    if requested == 0 {
        return Err(TableError::InvalidCapacity(requested));
    }
    requested
        .checked_next_power_of_two()
        .ok_or(TableError::InvalidCapacity(requested))
}

impl<'a, K, V> FlatTable<'a, K, V, SipBuildHasher>
where
    K: Hash + Eq,
{
    /// Creates a table for `capacity` entries with the default hasher.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum live entries, rounded up to a power of two
    /// * `allocator` - Arena view supplying the arrays (any element type)
    /// * `group_words` - Probe-group width in 64-bit control words: 1, 2 or 4
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidCapacity`] for zero or unroundable capacity.
    /// - [`TableError::InvalidGroupWidth`] for an unsupported `group_words`.
    /// - [`TableError::Arena`] if the arena cannot hold the arrays.
    pub fn new<T>(
        capacity: usize,
        allocator: ArenaAllocator<'a, T>,
        group_words: u32,
    ) -> TableResult<Self> {
        let width =
            GroupWidth::from_words(group_words).ok_or(TableError::InvalidGroupWidth(group_words))?;
        Self::with_hasher(capacity, allocator, width, SipBuildHasher::default())
    }

    /// Arena bytes needed for a table of `capacity` entries, including the
    /// worst-case alignment padding of the slot array.
    ///
    /// # Errors
    ///
    /// [`TableError::InvalidCapacity`] if the capacity is zero or the size
    /// overflows.
    pub fn required_bytes(capacity: usize, width: GroupWidth) -> TableResult<usize> {
        let capacity = normalize_capacity(capacity)?;
        let ctrl_len = capacity.max(width.lanes());
        capacity
            .checked_mul(mem::size_of::<(K, V)>())
            .and_then(|slots| slots.checked_add(ctrl_len))
            .and_then(|total| total.checked_add(mem::align_of::<(K, V)>() - 1))
            .ok_or(TableError::InvalidCapacity(capacity))
    }
}

impl<'a, K, V, S> FlatTable<'a, K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a table with an explicit probe-group width and hasher.
    ///
    /// # Errors
    ///
    /// Same as [`FlatTable::new`], minus the group-width check.
    pub fn with_hasher<T>(
        capacity: usize,
        allocator: ArenaAllocator<'a, T>,
        width: GroupWidth,
        hasher: S,
    ) -> TableResult<Self> {
        let capacity = normalize_capacity(capacity)?;
        let allocator = allocator.rebind::<u8>();
        let (ctrl, slots) = Self::allocate_storage(allocator, capacity, width)?;

        tracing::debug!(
            capacity,
            lanes = width.lanes(),
            arena_used = allocator.arena().used(),
            "flat table created"
        );

        Ok(Self {
            group_mask: ctrl.len() / width.lanes() - 1,
            ctrl,
            slots,
            width,
            len: 0,
            tombstones: 0,
            allocator,
            hasher,
            _owns: PhantomData,
        })
    }

    /// Carves the slot and control arrays out of the arena.
    ///
    /// Slots come first: if they fail nothing is consumed.
    #[allow(clippy::type_complexity)]
    fn allocate_storage(
        allocator: ArenaAllocator<'a, u8>,
        capacity: usize,
        width: GroupWidth,
    ) -> TableResult<(&'a mut [u8], &'a mut [MaybeUninit<(K, V)>])> {
        let slots = allocator.rebind::<(K, V)>().allocate_uninit_slice(capacity)?;
        let ctrl = allocator.allocate_filled(capacity.max(width.lanes()), ctrl::EMPTY)?;
        ctrl[capacity..].fill(ctrl::PADDING);
        Ok((ctrl, slots))
    }

    #[inline]
    fn hash<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    fn probe_seq(&self, hash: u64) -> ProbeSeq {
        ProbeSeq::new(h1(hash), self.group_mask, self.width.lanes())
    }

    /// Returns the control bytes of the group starting at `base`.
    #[inline]
    fn group_at(&self, base: usize) -> &[u8] {
        &self.ctrl[base..base + self.width.lanes()]
    }

    /// Key of an occupied slot.
    #[inline]
    fn key_at(&self, index: usize) -> &K {
        debug_assert!(ctrl::is_full(self.ctrl[index]));
        // SAFETY: Callers only pass indices whose control byte is a
        // fingerprint, so the slot is initialized.
        unsafe { &self.slots[index].assume_init_ref().0 }
    }

    /// True if the occupied slot at `index` holds `key`.
    #[inline]
    fn key_matches<Q>(&self, index: usize, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let stored: &Q = self.key_at(index).borrow();
        stored == key
    }

    /// Index of the slot holding `key`, if any.
    fn find_index<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let fingerprint = h2(hash);
        for base in self.probe_seq(hash) {
            let group = self.group_at(base);
            for lane in group::match_byte(group, fingerprint) {
                if self.key_matches(base + lane, key) {
                    return Some(base + lane);
                }
            }
            if group::match_empty(group).any_bit_set() {
                return None;
            }
        }
        None
    }

    /// Inserts `key -> value` if `key` is absent.
    ///
    /// The first EMPTY or DELETED slot on the probe path is claimed, but the
    /// walk continues up to the first group with an EMPTY lane so a key
    /// stored past a tombstone is still detected.
    ///
    /// This is **O(1)** expected with **zero arena allocations**.
    pub fn insert(&mut self, key: K, value: V) -> InsertOutcome {
        let hash = self.hash(&key);
        let fingerprint = h2(hash);
        let mut claim = None;

        for base in self.probe_seq(hash) {
            let group = self.group_at(base);
            for lane in group::match_byte(group, fingerprint) {
                if *self.key_at(base + lane) == key {
                    return InsertOutcome::AlreadyPresent;
                }
            }
            if claim.is_none() {
                claim = group::match_empty_or_deleted(group)
                    .lowest_set_bit()
                    .map(|lane| base + lane);
            }
            if group::match_empty(group).any_bit_set() {
                break;
            }
        }

        let Some(index) = claim else {
            return InsertOutcome::TableFull;
        };
        if self.ctrl[index] == ctrl::DELETED {
            self.tombstones -= 1;
        }
        self.ctrl[index] = fingerprint;
        self.slots[index].write((key, value));
        self.len += 1;
        InsertOutcome::Inserted
    }

    /// Copies the value stored for `key` into `out`.
    ///
    /// Returns false, leaving `out` untouched, when the key is absent.
    pub fn find<Q>(&self, key: &Q, out: &mut V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        match self.get(key) {
            Some(value) => {
                out.clone_from(value);
                true
            }
            None => false,
        }
    }

    /// Returns a reference to the value stored for `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(self.hash(key), key)?;
        // SAFETY: `find_index` only returns occupied slots.
        let (k, v) = unsafe { self.slots[index].assume_init_ref() };
        Some((k, v))
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(self.hash(key), key)?;
        // SAFETY: `find_index` only returns occupied slots.
        Some(unsafe { &mut self.slots[index].assume_init_mut().1 })
    }

    /// Returns true if `key` is present.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_index(self.hash(key), key).is_some()
    }

    /// Removes `key` and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(self.hash(key), key)?;
        let (_, value) = self.take(index);
        Some(value)
    }

    /// Removes `key`, dropping its value. Returns false on a miss.
    #[inline]
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Moves the entry out of an occupied slot and retires the slot.
    fn take(&mut self, index: usize) -> (K, V) {
        let lanes = self.width.lanes();
        let base = index & !(lanes - 1);

        // A group that still has an EMPTY lane has stopped every probe that
        // reached it, so no key depends on this slot staying non-EMPTY.
        if group::match_empty(self.group_at(base)).any_bit_set() {
            self.ctrl[index] = ctrl::EMPTY;
        } else {
            self.ctrl[index] = ctrl::DELETED;
            self.tombstones += 1;
        }
        self.len -= 1;

        // SAFETY: The slot was occupied and its control byte has just been
        // cleared, so it is read exactly once.
        unsafe { self.slots[index].assume_init_read() }
    }

    /// Number of groups a lookup for `key` examines.
    ///
    /// Counts the same walk `find` performs, hit or miss. Useful to check
    /// that misses terminate early as the table grows.
    pub fn probe_length<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        let fingerprint = h2(hash);
        let mut groups = 0;
        for base in self.probe_seq(hash) {
            groups += 1;
            let group = self.group_at(base);
            if group::match_byte(group, fingerprint)
                .into_iter()
                .any(|lane| self.key_matches(base + lane, key))
            {
                break;
            }
            if group::match_empty(group).any_bit_set() {
                break;
            }
        }
        groups
    }

    /// Re-homes every live entry into freshly allocated arrays of
    /// `capacity` slots (rounded up to a power of two), dropping all
    /// tombstones.
    ///
    /// Never called implicitly. The previous arrays stay in the arena as
    /// dead space until the arena is reset.
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidCapacity`] for zero or unroundable capacity.
    /// - [`TableError::CapacityTooSmall`] if `capacity < len()`.
    /// - [`TableError::Arena`] if the arena cannot hold the new arrays.
    ///
    /// On error the table is unchanged.
    pub fn rebuild(&mut self, capacity: usize) -> TableResult<()> {
        let capacity = normalize_capacity(capacity)?;
        if capacity < self.len {
            return Err(TableError::CapacityTooSmall {
                requested: capacity,
                len: self.len,
            });
        }

        let (ctrl, slots) = Self::allocate_storage(self.allocator, capacity, self.width)?;
        let old_ctrl = mem::replace(&mut self.ctrl, ctrl);
        let old_slots = mem::replace(&mut self.slots, slots);
        let old_capacity = old_slots.len();
        let dropped_tombstones = self.tombstones;

        self.group_mask = self.ctrl.len() / self.width.lanes() - 1;
        self.len = 0;
        self.tombstones = 0;

        for (byte, slot) in old_ctrl.iter_mut().zip(old_slots.iter_mut()) {
            if ctrl::is_full(*byte) {
                *byte = ctrl::EMPTY;
                // SAFETY: Occupied slot, read once; its control byte is cleared.
                let (key, value) = unsafe { slot.assume_init_read() };
                let outcome = self.insert(key, value);
                debug_assert_eq!(outcome, InsertOutcome::Inserted);
            }
        }

        tracing::debug!(
            old_capacity,
            capacity,
            live = self.len,
            dropped_tombstones,
            "flat table rebuilt"
        );
        Ok(())
    }
}

impl<'a, K, V, S> FlatTable<'a, K, V, S> {
    /// Returns the number of live entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entry is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the normalized capacity (slot count).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of DELETED slots.
    #[inline]
    #[must_use]
    pub const fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Returns the probe-group width.
    #[inline]
    #[must_use]
    pub const fn group_width(&self) -> GroupWidth {
        self.width
    }

    /// Returns the allocator backing this table.
    #[inline]
    #[must_use]
    pub const fn allocator(&self) -> ArenaAllocator<'a, u8> {
        self.allocator
    }

    /// Returns the hash builder.
    #[inline]
    #[must_use]
    pub const fn hasher(&self) -> &S {
        &self.hasher
    }

    /// `(len + tombstones) / capacity`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn load_factor(&self) -> f64 {
        (self.len + self.tombstones) as f64 / self.capacity() as f64
    }

    /// `tombstones / capacity`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tombstone_ratio(&self) -> f64 {
        self.tombstones as f64 / self.capacity() as f64
    }

    /// True when tombstones make up at least `threshold` of the slots.
    #[must_use]
    pub fn needs_rebuild(&self, threshold: f64) -> bool {
        self.tombstones > 0 && self.tombstone_ratio() >= threshold
    }

    /// Drops every entry and marks all slots EMPTY. No allocation.
    pub fn clear(&mut self) {
        let dropped = self.len;
        self.drop_entries();
        self.len = 0;
        self.tombstones = 0;
        tracing::trace!(dropped, "flat table cleared");
    }

    /// Drops occupied slots and resets their control bytes to EMPTY.
    fn drop_entries(&mut self) {
        let capacity = self.slots.len();
        for (byte, slot) in self.ctrl[..capacity].iter_mut().zip(self.slots.iter_mut()) {
            let full = ctrl::is_full(*byte);
            *byte = ctrl::EMPTY;
            if full && mem::needs_drop::<(K, V)>() {
                // SAFETY: The slot was occupied; its byte is EMPTY before the
                // drop so a panicking destructor cannot cause a second drop.
                unsafe { slot.assume_init_drop() };
            }
        }
    }

    /// Iterates over live entries in slot order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            ctrl: &self.ctrl[..self.slots.len()],
            slots: &self.slots[..],
            index: 0,
            remaining: self.len,
        }
    }
}

impl<K, V, S> Drop for FlatTable<'_, K, V, S> {
    fn drop(&mut self) {
        if mem::needs_drop::<(K, V)>() {
            self.drop_entries();
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for FlatTable<'_, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'t, K, V, S> IntoIterator for &'t FlatTable<'_, K, V, S> {
    type Item = (&'t K, &'t V);
    type IntoIter = Iter<'t, K, V>;

    fn into_iter(self) -> Iter<'t, K, V> {
        self.iter()
    }
}

/// Iterator over the live entries of a [`FlatTable`].
pub struct Iter<'t, K, V> {
    ctrl: &'t [u8],
    slots: &'t [MaybeUninit<(K, V)>],
    index: usize,
    remaining: usize,
}

impl<'t, K, V> Iterator for Iter<'t, K, V> {
    type Item = (&'t K, &'t V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.slots.len() {
            let index = self.index;
            self.index += 1;
            if ctrl::is_full(self.ctrl[index]) {
                self.remaining -= 1;
                // SAFETY: Fingerprint byte, so the slot is initialized. The
                // shared borrow of the table keeps it that way for 't.
                let (k, v) = unsafe { self.slots[index].assume_init_ref() };
                return Some((k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
