//! Property tests for the directory and map lifecycle.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use vh_core::BlockCoord;
use vh_map::{HashEntry, MapConfig, VoxelMap};

fn coord() -> impl Strategy<Value = BlockCoord> {
    (-40i32..40, -40i32..40, -40i32..40).prop_map(|(x, y, z)| BlockCoord::new(x, y, z))
}

/// Small directory so collisions and overflow chains are common.
fn tight_map() -> VoxelMap {
    VoxelMap::new(MapConfig::new(8, 2, 128, 128).with_voxels(4, 0.1)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Insert followed by lookup returns the same ptr; others stay absent.
    #[test]
    fn lookup_returns_inserted_ptr(
        coords in prop::collection::vec(coord(), 1..60),
        probes in prop::collection::vec(coord(), 0..40),
    ) {
        let map = tight_map();
        let mut model: HashMap<BlockCoord, u32> = HashMap::new();
        for c in &coords {
            let ptr = map.allocate_block(*c).unwrap();
            let prev = *model.entry(*c).or_insert(ptr);
            prop_assert_eq!(prev, ptr);
        }
        for (c, p) in &model {
            prop_assert_eq!(map.lookup(*c), Some(*p));
        }
        for c in probes.iter().filter(|c| !model.contains_key(*c)) {
            prop_assert_eq!(map.lookup(*c), None);
        }
        prop_assert_eq!(map.occupied_count(), model.len());

        let distinct: HashSet<u32> = model.values().copied().collect();
        prop_assert_eq!(distinct.len(), model.len());
    }

    /// After collection, reclaimed coordinates are absent, survivors keep
    /// their ptrs, a second pass reclaims nothing and the freed blocks are
    /// allocatable again.
    #[test]
    fn gc_reclaims_exactly_failing_entries(
        coords in prop::collection::hash_set(coord(), 1..60),
        modulus in 2i32..5,
    ) {
        let mut map = tight_map();
        let mut before = HashMap::new();
        for c in &coords {
            before.insert(*c, map.allocate_block(*c).unwrap());
        }
        let keep = |e: &HashEntry| (e.pos.x - e.pos.y).rem_euclid(modulus) != 0;

        let doomed = map.directory().iter_occupied().filter(|e| !keep(e)).count();
        let reclaimed = map.garbage_collect(|e, _| keep(e));
        prop_assert_eq!(reclaimed, doomed);
        prop_assert_eq!(map.garbage_collect(|e, _| keep(e)), 0);

        for (c, p) in &before {
            let entry = HashEntry { pos: *c, ptr: *p, next: 0 };
            if keep(&entry) {
                prop_assert_eq!(map.lookup(*c), Some(*p));
            } else {
                prop_assert_eq!(map.lookup(*c), None);
            }
        }

        prop_assert_eq!(map.pool().available(), 128 - coords.len() + reclaimed);
        for c in before.keys() {
            map.allocate_block(*c).unwrap();
        }
        prop_assert_eq!(map.occupied_count(), coords.len());
    }

    /// Compaction returns exactly the matching occupied entries.
    #[test]
    fn compact_matches_filter(
        coords in prop::collection::vec(coord(), 0..60),
        threshold in -40i32..40,
    ) {
        let map = tight_map();
        for c in &coords {
            map.allocate_block(*c).unwrap();
        }
        let pred = |e: &HashEntry| e.pos.z >= threshold;

        let got: HashSet<HashEntry> = map.compact(pred).into_iter().collect();
        let expected: HashSet<HashEntry> = map.directory().iter_occupied().filter(pred).collect();
        prop_assert_eq!(got, expected);
    }

    /// Batch lookup agrees with single lookups.
    #[test]
    fn batch_lookup_matches_single(
        coords in prop::collection::vec(coord(), 0..40),
        probes in prop::collection::vec(coord(), 0..40),
    ) {
        let map = tight_map();
        for c in &coords {
            map.allocate_block(*c).unwrap();
        }
        let result = map.lookup_batch(&probes);
        prop_assert_eq!(result.total(), probes.len());
        for (i, c) in probes.iter().enumerate() {
            prop_assert_eq!(result.get(i), map.lookup(*c));
        }
    }
}
