//! Fixed-capacity arena of voxel blocks.
//!
//! Memory layout: `voxels[block_idx * voxels_per_block + cell_idx]`, with a
//! parallel `mesh_units` array of the same shape. Blocks carry no coordinate;
//! the directory entry that points at a block is its only owner.

use rayon::prelude::*;

use crate::error::{MapError, Result};
use crate::memory::free_list::IndexStack;
use crate::memory::voxel::{MeshUnit, Voxel};

/// Exclusive view of one pool block, handed out by [`BlockPool::par_blocks_mut`].
pub struct BlockMut<'a> {
    /// Pool index of the block.
    pub index: u32,
    /// The block's voxels.
    pub voxels: &'a mut [Voxel],
    /// The block's mesh units.
    pub mesh_units: &'a mut [MeshUnit],
}

/// Structure-of-Arrays block pool with a lock-free free-list.
pub struct BlockPool {
    voxels: Box<[Voxel]>,
    mesh_units: Box<[MeshUnit]>,
    voxels_per_block: usize,
    free: IndexStack,
}

impl BlockPool {
    /// Create a pool of `capacity` blocks, each `voxels_per_block` cells.
    pub fn new(capacity: usize, voxels_per_block: usize) -> Self {
        let voxels_per_block = voxels_per_block.max(1);
        let total = capacity * voxels_per_block;
        Self {
            voxels: vec![Voxel::ZERO; total].into_boxed_slice(),
            mesh_units: vec![MeshUnit::EMPTY; total].into_boxed_slice(),
            voxels_per_block,
            free: IndexStack::full(capacity),
        }
    }

    /// Take an unused block. Safe to call from many tasks at once.
    #[inline]
    pub fn allocate(&self) -> Result<u32> {
        self.free.pop().ok_or(MapError::PoolExhausted {
            capacity: self.capacity(),
        })
    }

    /// Return a block to the free-list.
    ///
    /// The caller must own `index` and must not touch it afterwards. The
    /// block is not cleared; use [`clear_block`](Self::clear_block) first when
    /// it held data.
    #[inline]
    pub fn release(&self, index: u32) {
        self.free.push(index);
    }

    /// Number of blocks in the pool.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Number of free blocks.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.available()
    }

    /// Number of blocks handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Cells per block.
    #[inline]
    pub fn voxels_per_block(&self) -> usize {
        self.voxels_per_block
    }

    #[inline]
    fn range(&self, index: u32) -> core::ops::Range<usize> {
        let start = index as usize * self.voxels_per_block;
        start..start + self.voxels_per_block
    }

    /// Voxels of one block.
    #[inline]
    pub fn block_voxels(&self, index: u32) -> &[Voxel] {
        &self.voxels[self.range(index)]
    }

    /// Mutable voxels of one block.
    #[inline]
    pub fn block_voxels_mut(&mut self, index: u32) -> &mut [Voxel] {
        let range = self.range(index);
        &mut self.voxels[range]
    }

    /// Mesh units of one block.
    #[inline]
    pub fn block_mesh_units(&self, index: u32) -> &[MeshUnit] {
        &self.mesh_units[self.range(index)]
    }

    /// Mutable mesh units of one block.
    #[inline]
    pub fn block_mesh_units_mut(&mut self, index: u32) -> &mut [MeshUnit] {
        let range = self.range(index);
        &mut self.mesh_units[range]
    }

    /// Reset one block to the never-observed state.
    pub fn clear_block(&mut self, index: u32) {
        let range = self.range(index);
        self.voxels[range.clone()].fill(Voxel::ZERO);
        self.mesh_units[range].fill(MeshUnit::EMPTY);
    }

    /// Clear every block and put all indices back on the free-list.
    pub fn reset(&mut self) {
        self.voxels.par_iter_mut().for_each(|v| *v = Voxel::ZERO);
        self.mesh_units
            .par_iter_mut()
            .for_each(|m| *m = MeshUnit::EMPTY);
        self.free.reset();
    }

    /// Parallel exclusive access to the blocks whose `mask` entry is set.
    ///
    /// `mask` is indexed by pool index; indices past its end are skipped.
    pub fn par_blocks_mut<'a>(
        &'a mut self,
        mask: &'a [bool],
    ) -> impl ParallelIterator<Item = BlockMut<'a>> + 'a {
        let n = self.voxels_per_block;
        self.voxels
            .par_chunks_mut(n)
            .zip(self.mesh_units.par_chunks_mut(n))
            .enumerate()
            .filter(move |(i, _)| mask.get(*i).copied().unwrap_or(false))
            .map(|(i, (voxels, mesh_units))| BlockMut {
                index: i as u32,
                voxels,
                mesh_units,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_exhausted() {
        let pool = BlockPool::new(2, 8);
        assert_eq!(pool.allocate(), Ok(0));
        assert_eq!(pool.allocate(), Ok(1));
        assert_eq!(pool.allocate(), Err(MapError::PoolExhausted { capacity: 2 }));
        assert_eq!(pool.in_use(), 2);

        pool.release(1);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.allocate(), Ok(1));
    }

    #[test]
    fn test_block_access_and_clear() {
        let mut pool = BlockPool::new(3, 8);
        let idx = pool.allocate().unwrap();

        pool.block_voxels_mut(idx)[5].sdf = 0.5;
        pool.block_mesh_units_mut(idx)[2].cube_index = 9;
        assert_eq!(pool.block_voxels(idx)[5].sdf, 0.5);
        assert_eq!(pool.block_mesh_units(idx)[2].cube_index, 9);
        assert_eq!(pool.block_voxels(idx).len(), 8);

        pool.clear_block(idx);
        assert_eq!(pool.block_voxels(idx)[5], Voxel::ZERO);
        assert_eq!(pool.block_mesh_units(idx)[2], MeshUnit::EMPTY);
    }

    #[test]
    fn test_par_blocks_mut_respects_mask() {
        let mut pool = BlockPool::new(4, 8);
        let mask = [true, false, true];

        pool.par_blocks_mut(&mask).for_each(|block| {
            for v in block.voxels.iter_mut() {
                v.weight = block.index as f32 + 1.0;
            }
        });

        assert!(pool.block_voxels(0).iter().all(|v| v.weight == 1.0));
        assert!(pool.block_voxels(1).iter().all(|v| v.weight == 0.0));
        assert!(pool.block_voxels(2).iter().all(|v| v.weight == 3.0));
        assert!(pool.block_voxels(3).iter().all(|v| v.weight == 0.0));
    }

    #[test]
    fn test_reset() {
        let mut pool = BlockPool::new(2, 8);
        let idx = pool.allocate().unwrap();
        pool.block_voxels_mut(idx)[0].weight = 3.0;
        pool.reset();
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.block_voxels(idx)[0], Voxel::ZERO);
    }
}
