//! `VoxelMap`: hash directory plus block pool behind one coordinate mapper.
//!
//! Methods taking `&self` may run concurrently from many tasks (lookup,
//! allocation, compaction). Methods taking `&mut self` are the stage
//! barriers: no shared-borrow operation can overlap them.

use vh_core::{BlockCoord, CoordinateMapper, Point3};

use crate::config::MapConfig;
use crate::error::Result;
use crate::memory::{
    BatchLookupResult, BlockPool, CandidateEntries, HashDirectory, HashEntry, InsertOutcome,
};

/// Sparse voxel-block map.
pub struct VoxelMap {
    pub(crate) config: MapConfig,
    pub(crate) mapper: CoordinateMapper,
    pub(crate) directory: HashDirectory,
    pub(crate) pool: BlockPool,
}

impl VoxelMap {
    /// Create an empty map.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(config: MapConfig) -> Result<Self> {
        config.validate()?;
        let mapper = config.mapper()?;
        log::debug!(
            "voxel map: {} buckets x {} slots, {} overflow, {} blocks of {}^3",
            config.bucket_count,
            config.bucket_size,
            config.overflow_capacity,
            config.block_capacity,
            config.block_dim
        );
        Ok(Self {
            directory: HashDirectory::new(&config),
            pool: BlockPool::new(config.block_capacity, config.voxels_per_block()),
            mapper,
            config,
        })
    }

    /// Map configuration.
    #[inline]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Coordinate mapper.
    #[inline]
    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    /// The hash directory.
    #[inline]
    pub fn directory(&self) -> &HashDirectory {
        &self.directory
    }

    /// The block pool.
    #[inline]
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Pool index of the block at `pos`.
    #[inline]
    pub fn lookup(&self, pos: BlockCoord) -> Option<u32> {
        self.directory.lookup(pos)
    }

    /// Check if a block exists at `pos`.
    #[inline]
    pub fn contains(&self, pos: BlockCoord) -> bool {
        self.lookup(pos).is_some()
    }

    /// Look up many blocks at once.
    #[inline]
    pub fn lookup_batch(&self, coords: &[BlockCoord]) -> BatchLookupResult {
        self.directory.lookup_batch(coords)
    }

    /// Number of occupied directory entries.
    pub fn occupied_count(&self) -> usize {
        self.directory.occupied_count()
    }

    /// Pool index of the block at `pos`, allocating it if needed.
    ///
    /// Safe to call from many tasks at once; every caller resolving the same
    /// coordinate in one stage gets the same index.
    ///
    /// # Errors
    /// `PoolExhausted` or `DirectoryFull` (both fatal for the frame), or
    /// `CoordinateOutOfRange`.
    pub fn allocate_block(&self, pos: BlockCoord) -> Result<u32> {
        if let Some(ptr) = self.directory.lookup(pos) {
            return Ok(ptr);
        }

        let ptr = match self.pool.allocate() {
            Ok(ptr) => ptr,
            Err(err) => {
                // A racer may have inserted `pos` with the last block.
                if let Some(ptr) = self.directory.resolve(pos) {
                    return Ok(ptr);
                }
                log::warn!("allocating block {:?}: {}", pos, err);
                return Err(err);
            }
        };

        match self.directory.insert(pos, ptr) {
            Ok(InsertOutcome::Inserted { .. }) => Ok(ptr),
            Ok(InsertOutcome::Duplicate { slot }) => {
                self.pool.release(ptr);
                Ok(self.directory.wait_published(slot))
            }
            Err(err) => {
                self.pool.release(ptr);
                if err.is_fatal() {
                    log::warn!("allocating block {:?}: {}", pos, err);
                }
                Err(err)
            }
        }
    }

    /// Allocate the block containing world point `p`.
    #[inline]
    pub fn allocate_at(&self, p: Point3) -> Result<u32> {
        self.allocate_block(self.mapper.world_to_block(p))
    }

    /// Delete the block at `pos`, clearing it and returning it to the pool.
    ///
    /// # Errors
    /// `NotFound` if `pos` has no block.
    pub fn delete_block(&mut self, pos: BlockCoord) -> Result<()> {
        let ptr = self.directory.delete(pos)?;
        self.pool.clear_block(ptr);
        self.pool.release(ptr);
        Ok(())
    }

    /// Entries satisfying `pred`, in unspecified order.
    pub fn compact<F>(&self, pred: F) -> Vec<HashEntry>
    where
        F: Fn(&HashEntry) -> bool + Sync,
    {
        let out = CandidateEntries::new(self.directory.entry_count());
        self.directory.compact_into(pred, &out);
        out.to_vec()
    }

    /// Append entries satisfying `pred` to `out`; returns `out.count()`.
    #[inline]
    pub fn compact_into<F>(&self, pred: F, out: &CandidateEntries) -> usize
    where
        F: Fn(&HashEntry) -> bool + Sync,
    {
        self.directory.compact_into(pred, out)
    }

    /// Per-pool-index membership of the given entries.
    pub(crate) fn block_mask<I>(&self, entries: I) -> Vec<bool>
    where
        I: IntoIterator<Item = HashEntry>,
    {
        let mut mask = vec![false; self.pool.capacity()];
        for e in entries {
            if let Some(m) = mask.get_mut(e.ptr as usize) {
                *m = true;
            }
        }
        mask
    }

    /// Drop every block.
    pub fn reset(&mut self) {
        self.directory.reset();
        self.pool.reset();
        log::debug!("voxel map reset");
    }

    /// Rebuild with a new configuration, dropping all content.
    ///
    /// # Errors
    /// `InvalidConfig`; the map is left unchanged in that case.
    pub fn resize(&mut self, config: MapConfig) -> Result<()> {
        *self = Self::new(config)?;
        log::info!(
            "voxel map resized to {} entries, {} blocks",
            config.entry_count(),
            config.block_capacity
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;

    fn small_map() -> VoxelMap {
        VoxelMap::new(MapConfig::new(8, 2, 8, 4)).unwrap()
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let map = small_map();
        let pos = BlockCoord::new(3, -1, 0);
        let a = map.allocate_block(pos).unwrap();
        let b = map.allocate_block(pos).unwrap();
        assert_eq!(a, b);
        assert_eq!(map.pool().in_use(), 1);
        assert!(map.contains(pos));
    }

    #[test]
    fn test_pool_exhaustion_does_not_leak() {
        let map = small_map();
        for i in 0..4 {
            map.allocate_block(BlockCoord::new(i, 0, 0)).unwrap();
        }
        let err = map.allocate_block(BlockCoord::new(10, 0, 0)).unwrap_err();
        assert_eq!(err, MapError::PoolExhausted { capacity: 4 });
        // Existing blocks still resolve when the pool is empty.
        assert_eq!(map.allocate_block(BlockCoord::new(2, 0, 0)), Ok(2));
    }

    #[test]
    fn test_delete_returns_block() {
        let mut map = small_map();
        let pos = BlockCoord::new(0, 0, 1);
        let ptr = map.allocate_block(pos).unwrap();
        map.pool.block_voxels_mut(ptr)[0].weight = 1.0;

        map.delete_block(pos).unwrap();
        assert!(!map.contains(pos));
        assert_eq!(map.pool().available(), 4);
        assert!(matches!(
            map.delete_block(pos),
            Err(MapError::NotFound { .. })
        ));

        let again = map.allocate_block(BlockCoord::new(5, 5, 5)).unwrap();
        assert_eq!(again, ptr);
        assert_eq!(map.pool().block_voxels(again)[0].weight, 0.0);
    }

    #[test]
    fn test_compact() {
        let map = small_map();
        for i in 0..4 {
            map.allocate_block(BlockCoord::new(i, 0, 0)).unwrap();
        }
        let mut xs: Vec<i32> = map
            .compact(|e| e.pos.x >= 2)
            .into_iter()
            .map(|e| e.pos.x)
            .collect();
        xs.sort_unstable();
        assert_eq!(xs, vec![2, 3]);
    }

    #[test]
    fn test_resize_and_reset() {
        let mut map = small_map();
        map.allocate_at(Point3::new(0.5, 0.5, 0.5)).unwrap();
        assert_eq!(map.occupied_count(), 1);

        map.reset();
        assert_eq!(map.occupied_count(), 0);
        assert_eq!(map.pool().available(), 4);

        map.resize(MapConfig::new(16, 4, 16, 32)).unwrap();
        assert_eq!(map.pool().capacity(), 32);
        assert_eq!(map.directory().entry_count(), 80);

        assert!(map.resize(MapConfig::new(0, 4, 16, 32)).is_err());
        assert_eq!(map.pool().capacity(), 32);
    }
}
