//! Integration tests for the arena-backed flat table.

use std::collections::HashSet;
use std::hash::{BuildHasherDefault, Hasher};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stratakv_core::{
    Arena, ArenaAllocator, FlatTable, GroupWidth, InsertOutcome, TableError,
};

/// Hashes a `u64` to itself, so tests control the home group.
#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

type Identity = BuildHasherDefault<IdentityHasher>;

fn unique_keys(count: usize, seed: u64) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key: u64 = rng.gen();
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}

#[test]
fn test_concrete_scenario() {
    let arena = Arena::new(1 << 20).unwrap();
    let alloc: ArenaAllocator<'_, u64> = ArenaAllocator::new(&arena);
    let mut table: FlatTable<'_, u64, u64> = FlatTable::new(1024, alloc, 1).unwrap();

    assert_eq!(table.insert(5, 50), InsertOutcome::Inserted);
    assert_eq!(table.insert(5, 99), InsertOutcome::AlreadyPresent);

    let mut out = 0;
    assert!(table.find(&5, &mut out));
    assert_eq!(out, 50);

    // 1023 more distinct keys fill the table exactly.
    for key in (0..1024u64).filter(|&k| k != 5) {
        assert_eq!(table.insert(key, key * 10), InsertOutcome::Inserted, "key {key}");
    }
    assert_eq!(table.len(), 1024);
    assert_eq!(table.insert(5000, 1), InsertOutcome::TableFull);

    // Nothing was dropped or overwritten.
    assert!(table.find(&5, &mut out));
    assert_eq!(out, 50);
    for key in (0..1024u64).filter(|&k| k != 5) {
        assert_eq!(table.get(&key), Some(&(key * 10)));
    }
    assert!(!table.contains_key(&5000));
}

#[test]
fn test_round_trip_random_keys() {
    for width in [GroupWidth::Narrow, GroupWidth::Standard, GroupWidth::Wide] {
        let arena = Arena::new(1 << 22).unwrap();
        let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
        let mut table: FlatTable<'_, u64, u64> =
            FlatTable::new(1 << 14, alloc, width.words()).unwrap();

        let keys = unique_keys(12_000, 42);
        for &key in &keys {
            assert_eq!(table.insert(key, !key), InsertOutcome::Inserted);
        }
        for &key in &keys {
            let mut out = 0;
            assert!(table.find(&key, &mut out));
            assert_eq!(out, !key);
        }
        assert_eq!(table.len(), keys.len());
        assert_eq!(table.iter().count(), keys.len());
    }
}

#[test]
fn test_duplicate_insert_keeps_value() {
    let arena = Arena::new(1 << 16).unwrap();
    let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
    let mut table: FlatTable<'_, u64, u64> = FlatTable::new(64, alloc, 2).unwrap();

    for key in 0..32u64 {
        let _ = table.insert(key, key);
    }
    for key in 0..32u64 {
        assert_eq!(table.insert(key, 1000 + key), InsertOutcome::AlreadyPresent);
        assert_eq!(table.get(&key), Some(&key));
    }
    assert_eq!(table.len(), 32);
}

#[test]
fn test_capacity_bound_every_width() {
    for width in [GroupWidth::Narrow, GroupWidth::Standard, GroupWidth::Wide] {
        let arena = Arena::new(1 << 16).unwrap();
        let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
        let mut table: FlatTable<'_, u64, u64> =
            FlatTable::new(100, alloc, width.words()).unwrap();
        let capacity = table.capacity();
        assert_eq!(capacity, 128);

        let keys = unique_keys(capacity + 1, 7);
        let mut inserted = Vec::new();
        let mut full_at = None;
        for (i, &key) in keys.iter().enumerate() {
            match table.insert(key, key) {
                InsertOutcome::Inserted => inserted.push(key),
                InsertOutcome::TableFull => {
                    full_at = Some(i);
                    break;
                }
                InsertOutcome::AlreadyPresent => unreachable!("keys are unique"),
            }
        }
        assert!(full_at.is_some_and(|i| i <= capacity));
        for key in inserted {
            assert_eq!(table.get(&key), Some(&key));
        }
    }
}

#[test]
fn test_miss_probe_length_independent_of_size() {
    let mut means = Vec::new();

    for shift in [10u32, 14, 18] {
        let capacity = 1usize << shift;
        let arena = Arena::new(capacity * 20 + 4096).unwrap();
        let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
        let mut table: FlatTable<'_, u64, u64> = FlatTable::new(capacity, alloc, 2).unwrap();

        // Hold load at 50%.
        for key in unique_keys(capacity / 2, u64::from(shift)) {
            let _ = table.insert(key, key);
        }

        let misses = 2_000u64;
        let total: usize = (0..misses)
            .map(|i| 0xDEAD_BEEF_0000_0000 + i)
            .filter(|k| !table.contains_key(k))
            .map(|k| table.probe_length(&k))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = total as f64 / misses as f64;
        means.push(mean);
    }

    // A miss at 50% load ends within a couple of groups, whatever the size.
    for &mean in &means {
        assert!(mean < 2.0, "mean miss probe length {mean}");
    }
    assert!(means[2] < means[0] + 0.5);
}

#[test]
fn test_tombstone_crossed_by_later_key() {
    let arena = Arena::new(1 << 16).unwrap();
    let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
    // 64 slots in eight 8-lane groups; keys that are multiples of 8 home in group 0.
    let mut table: FlatTable<'_, u64, u64, Identity> =
        FlatTable::with_hasher(64, alloc, GroupWidth::Narrow, Identity::default()).unwrap();

    let k1 = 0u64;
    for key in (0..8u64).map(|i| i * 8) {
        assert_eq!(table.insert(key, key), InsertOutcome::Inserted);
    }
    assert!(table.erase(&k1));
    assert_eq!(table.tombstones(), 1);

    // Group 0 is still full apart from the tombstone, so K2 claims it.
    let k2 = 64u64;
    assert_eq!(table.insert(k2, 640), InsertOutcome::Inserted);
    assert_eq!(table.tombstones(), 0);

    // K3 has to cross group 0 entirely.
    let k3 = 72u64;
    assert_eq!(table.insert(k3, 720), InsertOutcome::Inserted);
    assert_eq!(table.probe_length(&k3), 2);

    // Free a slot in group 0 again: lookups of K3 must walk past it.
    assert!(table.erase(&k2));
    let mut out = 0;
    assert!(table.find(&k3, &mut out));
    assert_eq!(out, 720);
    assert!(!table.find(&k1, &mut out));
    assert!(!table.find(&k2, &mut out));
}

#[test]
fn test_table_full_then_rebuild_larger() {
    let arena = Arena::new(1 << 20).unwrap();
    let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
    let mut table: FlatTable<'_, u64, u64> = FlatTable::new(256, alloc, 2).unwrap();

    let keys = unique_keys(257, 3);
    for &key in &keys[..256] {
        assert!(table.insert(key, key).is_inserted());
    }
    assert_eq!(table.insert(keys[256], 0), InsertOutcome::TableFull);

    table.rebuild(512).unwrap();
    assert_eq!(table.capacity(), 512);
    assert!(table.insert(keys[256], keys[256]).is_inserted());
    for &key in &keys {
        assert_eq!(table.get(&key), Some(&key));
    }
}

#[test]
fn test_churn_with_maintenance() {
    for width in [GroupWidth::Narrow, GroupWidth::Standard, GroupWidth::Wide] {
        let arena = Arena::new(1 << 22).unwrap();
        let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
        let mut table: FlatTable<'_, u64, u64> = FlatTable::new(1024, alloc, width.words()).unwrap();
        let mut live = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        for _ in 0..50_000 {
            let key = rng.gen_range(0..2_000u64);
            if rng.gen_bool(0.5) {
                let outcome = table.insert(key, key + 1);
                if live.contains(&key) {
                    assert_eq!(outcome, InsertOutcome::AlreadyPresent, "{width:?}");
                } else if outcome.is_inserted() {
                    live.insert(key);
                } else {
                    assert_eq!(outcome, InsertOutcome::TableFull, "{width:?}");
                }
            } else {
                assert_eq!(table.erase(&key), live.remove(&key), "{width:?}");
            }

            assert_eq!(table.len(), live.len());
            assert!(table.len() + table.tombstones() <= table.capacity());
            if table.needs_rebuild(0.25) {
                table.rebuild(table.capacity()).unwrap();
            }
        }

        for key in 0..2_000u64 {
            let expected = live.contains(&key).then_some(key + 1);
            assert_eq!(table.get(&key).copied(), expected, "{width:?} key {key}");
        }
    }
}

#[test]
fn test_tables_share_one_arena() {
    let arena = Arena::new(1 << 20).unwrap();
    let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
    let mut a: FlatTable<'_, u64, u64> = FlatTable::new(128, alloc, 2).unwrap();
    let mut b: FlatTable<'_, String, u64> = FlatTable::new(128, alloc, 2).unwrap();

    assert!(a.allocator() == b.allocator());
    let _ = a.insert(1, 1);
    let _ = b.insert("one".to_string(), 1);
    assert_eq!(a.get(&1), b.get("one"));
    assert_eq!(arena.allocations(), 4);
}

#[test]
fn test_arena_too_small_for_table() {
    let arena = Arena::new(1024).unwrap();
    let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
    let err = FlatTable::<u64, u64>::new(1024, alloc, 2).unwrap_err();
    assert!(matches!(err, TableError::Arena(_)));
}

#[test]
fn test_required_bytes_is_enough() {
    for width in [GroupWidth::Narrow, GroupWidth::Wide] {
        let bytes = FlatTable::<u64, u64>::required_bytes(300, width).unwrap();
        let arena = Arena::new(bytes).unwrap();
        let alloc: ArenaAllocator<'_, u8> = ArenaAllocator::new(&arena);
        let table = FlatTable::<u64, u64>::new(300, alloc, width.words()).unwrap();
        assert_eq!(table.capacity(), 512);
    }
}
