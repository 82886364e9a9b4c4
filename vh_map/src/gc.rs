//! Garbage collection and weight starvation.
//!
//! Collection is mark then sweep. Mark resets every entry flag and flags the
//! entries whose block fails the retention predicate. Sweep runs one task per
//! bucket (chains never cross buckets), unlinks flagged entries, and the
//! reclaimed blocks are cleared before going back to the pool.

use rayon::prelude::*;

use crate::config::RetentionPolicy;
use crate::map::VoxelMap;
use crate::memory::{HashEntry, Voxel};

impl VoxelMap {
    /// Reclaim every block for which `retain` returns false.
    ///
    /// Returns the number of entries reclaimed. With a deterministic
    /// predicate and no inserts in between, a second call reclaims nothing.
    pub fn garbage_collect<F>(&mut self, retain: F) -> usize
    where
        F: Fn(&HashEntry, &[Voxel]) -> bool + Sync,
    {
        let pool = &self.pool;
        let flagged = self
            .directory
            .mark(|entry| retain(entry, pool.block_voxels(entry.ptr)));
        if flagged == 0 {
            return 0;
        }

        let freed = self.directory.sweep();
        let mut mask = vec![false; self.pool.capacity()];
        for &ptr in &freed {
            mask[ptr as usize] = true;
        }
        self.pool.par_blocks_mut(&mask).for_each(|block| {
            block.voxels.fill(Voxel::ZERO);
            for m in block.mesh_units.iter_mut() {
                m.clear();
            }
        });
        for &ptr in &freed {
            self.pool.release(ptr);
        }

        log::debug!(
            "garbage collection: {} flagged, {} reclaimed, {} blocks free",
            flagged,
            freed.len(),
            self.pool.available()
        );
        freed.len()
    }

    /// Reclaim the blocks `policy` does not retain.
    #[inline]
    pub fn collect_garbage(&mut self, policy: &RetentionPolicy) -> usize {
        self.garbage_collect(|_, voxels| policy.retains(voxels))
    }

    /// Lower every voxel weight of every occupied block by `amount`,
    /// stopping at zero. A non-positive or NaN `amount` does nothing.
    ///
    /// Run before collection so blocks that stop being observed age out.
    pub fn starve(&mut self, amount: f32) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        let mask = self.block_mask(self.directory.iter_occupied());
        self.pool.par_blocks_mut(&mask).for_each(|block| {
            for v in block.voxels.iter_mut() {
                v.weight = (v.weight - amount).max(0.0);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use vh_core::BlockCoord;

    fn populated(n: i32) -> VoxelMap {
        let mut map = VoxelMap::new(MapConfig::new(8, 2, 16, 16)).unwrap();
        for i in 0..n {
            let ptr = map.allocate_block(BlockCoord::new(i, 0, 0)).unwrap();
            map.pool.block_voxels_mut(ptr)[0] = Voxel {
                sdf: 0.01,
                weight: i as f32,
                ..Voxel::ZERO
            };
        }
        map
    }

    #[test]
    fn test_gc_reclaims_and_clears() {
        let mut map = populated(6);
        let reclaimed = map.garbage_collect(|e, _| e.pos.x % 3 != 0);
        assert_eq!(reclaimed, 2);
        assert!(!map.contains(BlockCoord::new(0, 0, 0)));
        assert!(!map.contains(BlockCoord::new(3, 0, 0)));
        assert!(map.contains(BlockCoord::new(4, 0, 0)));
        assert_eq!(map.pool().available(), 12);

        // Freed blocks come back cleared.
        let ptr = map.allocate_block(BlockCoord::new(9, 9, 9)).unwrap();
        assert!(map.pool().block_voxels(ptr).iter().all(|v| *v == Voxel::ZERO));
    }

    #[test]
    fn test_gc_is_idempotent() {
        let mut map = populated(6);
        let policy = RetentionPolicy::new(2.5, 0.04);
        assert_eq!(map.collect_garbage(&policy), 3);
        assert_eq!(map.collect_garbage(&policy), 0);
        assert_eq!(map.occupied_count(), 3);
    }

    #[test]
    fn test_starve_then_collect() {
        let mut map = populated(4);
        map.starve(2.0);
        let weights: Vec<f32> = (0..4)
            .map(|i| {
                let ptr = map.lookup(BlockCoord::new(i, 0, 0)).unwrap();
                map.pool().block_voxels(ptr)[0].weight
            })
            .collect();
        assert_eq!(weights, vec![0.0, 0.0, 0.0, 1.0]);

        let reclaimed = map.collect_garbage(&RetentionPolicy::new(0.5, 0.04));
        assert_eq!(reclaimed, 3);
        assert!(map.contains(BlockCoord::new(3, 0, 0)));
    }

    #[test]
    fn test_starve_ignores_nan() {
        let mut map = populated(4);
        map.starve(f32::NAN);
        let ptr = map.lookup(BlockCoord::new(3, 0, 0)).unwrap();
        assert_eq!(map.pool().block_voxels(ptr)[0].weight, 3.0);
        assert_eq!(map.collect_garbage(&RetentionPolicy::new(0.5, 0.04)), 1);
    }
}
