//! Voxel and mesh-unit access by world point, voxel index or block offset.
//!
//! Every accessor takes an optional caller-held entry. When its position is
//! the target block the directory lookup is skipped. A stale entry yields a
//! wrong voxel but never an out-of-bounds access.

use vh_core::{BlockCoord, CellCoord, Point3, VoxelCoord};

use crate::error::{MapError, Result};
use crate::map::VoxelMap;
use crate::memory::{HashEntry, MeshUnit, Voxel};

/// Where to read or write a voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoxelQuery {
    /// Voxel containing a world point.
    World(Point3),
    /// Global voxel index.
    Voxel(VoxelCoord),
    /// Offset inside a block. Offsets past the block edge address the
    /// neighboring block.
    Local {
        /// Block coordinate.
        block: BlockCoord,
        /// Cell within the block.
        offset: CellCoord,
    },
}

impl From<Point3> for VoxelQuery {
    fn from(p: Point3) -> Self {
        VoxelQuery::World(p)
    }
}

impl From<VoxelCoord> for VoxelQuery {
    fn from(v: VoxelCoord) -> Self {
        VoxelQuery::Voxel(v)
    }
}

impl From<(BlockCoord, CellCoord)> for VoxelQuery {
    fn from((block, offset): (BlockCoord, CellCoord)) -> Self {
        VoxelQuery::Local { block, offset }
    }
}

impl VoxelMap {
    /// Block coordinate and linear in-block index addressed by `query`.
    pub fn locate(&self, query: VoxelQuery) -> (BlockCoord, usize) {
        match query {
            VoxelQuery::World(p) => self.mapper.locate_voxel(self.mapper.world_to_voxel(p)),
            VoxelQuery::Voxel(v) => self.mapper.locate_voxel(v),
            VoxelQuery::Local { block, offset } => {
                if offset.is_within(self.mapper.block_dim()) {
                    (block, self.mapper.vectorize_offset(offset))
                } else {
                    self.mapper
                        .locate_voxel(self.mapper.offset_to_voxel(block, offset))
                }
            }
        }
    }

    /// Pool index of `block`, trying the caller's entry before the directory.
    #[inline]
    fn block_ptr(&self, block: BlockCoord, current: Option<&HashEntry>) -> Option<u32> {
        match current {
            Some(e) if e.pos == block && (e.ptr as usize) < self.pool.capacity() => Some(e.ptr),
            _ => self.directory.lookup(block),
        }
    }

    fn resolve_or_log(
        &self,
        query: VoxelQuery,
        current: Option<&HashEntry>,
    ) -> Result<(u32, usize)> {
        let (block, idx) = self.locate(query);
        match self.block_ptr(block, current) {
            Some(ptr) => Ok((ptr, idx)),
            None => {
                let err = MapError::vacant(block);
                log::error!("{} (query {:?})", err, query);
                Err(err)
            }
        }
    }

    /// Mutable voxel.
    ///
    /// # Errors
    /// `VacantBlock` if the block is not allocated; nothing is touched.
    pub fn voxel_mut(
        &mut self,
        query: impl Into<VoxelQuery>,
        current: Option<&HashEntry>,
    ) -> Result<&mut Voxel> {
        let (ptr, idx) = self.resolve_or_log(query.into(), current)?;
        Ok(&mut self.pool.block_voxels_mut(ptr)[idx])
    }

    /// Shared voxel.
    ///
    /// # Errors
    /// `VacantBlock` if the block is not allocated.
    pub fn voxel_ref(
        &self,
        query: impl Into<VoxelQuery>,
        current: Option<&HashEntry>,
    ) -> Result<&Voxel> {
        let (ptr, idx) = self.resolve_or_log(query.into(), current)?;
        Ok(&self.pool.block_voxels(ptr)[idx])
    }

    /// Mutable mesh unit.
    ///
    /// # Errors
    /// `VacantBlock` if the block is not allocated.
    pub fn mesh_unit_mut(
        &mut self,
        query: impl Into<VoxelQuery>,
        current: Option<&HashEntry>,
    ) -> Result<&mut MeshUnit> {
        let (ptr, idx) = self.resolve_or_log(query.into(), current)?;
        Ok(&mut self.pool.block_mesh_units_mut(ptr)[idx])
    }

    /// Shared mesh unit.
    ///
    /// # Errors
    /// `VacantBlock` if the block is not allocated.
    pub fn mesh_unit(
        &self,
        query: impl Into<VoxelQuery>,
        current: Option<&HashEntry>,
    ) -> Result<&MeshUnit> {
        let (ptr, idx) = self.resolve_or_log(query.into(), current)?;
        Ok(&self.pool.block_mesh_units(ptr)[idx])
    }

    /// Voxel value and whether its block exists.
    ///
    /// A vacant block reads as the zero voxel; this is not an error and is
    /// not logged.
    pub fn voxel_value(
        &self,
        query: impl Into<VoxelQuery>,
        current: Option<&HashEntry>,
    ) -> (Voxel, bool) {
        let (block, idx) = self.locate(query.into());
        match self.block_ptr(block, current) {
            Some(ptr) => (self.pool.block_voxels(ptr)[idx], true),
            None => (Voxel::ZERO, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    fn map() -> VoxelMap {
        VoxelMap::new(MapConfig::new(8, 2, 8, 8).with_voxels(8, 0.1)).unwrap()
    }

    #[test]
    fn test_queries_agree() {
        let mut map = map();
        let block = BlockCoord::new(1, 0, -1);
        map.allocate_block(block).unwrap();

        // Voxel (9, 2, -5) is offset (1, 2, 3) of block (1, 0, -1).
        map.voxel_mut(VoxelCoord::new(9, 2, -5), None).unwrap().sdf = 0.25;

        let local = (block, CellCoord::new(1, 2, 3));
        assert_eq!(map.voxel_ref(local, None).unwrap().sdf, 0.25);
        let world = Point3::new(0.9, 0.2, -0.5);
        let stored = *map.voxel_ref(local, None).unwrap();
        assert_eq!(map.voxel_value(world, None), (stored, true));
    }

    #[test]
    fn test_local_offset_past_edge() {
        let map = map();
        let (block, idx) = map.locate(VoxelQuery::Local {
            block: BlockCoord::new(0, 0, 0),
            offset: CellCoord::new(8, 0, 1),
        });
        assert_eq!(block, BlockCoord::new(1, 0, 0));
        assert_eq!(idx, 64);
    }

    #[test]
    fn test_vacant_access() {
        let mut map = map();
        let q = VoxelCoord::new(100, 0, 0);
        assert!(matches!(
            map.voxel_mut(q, None),
            Err(MapError::VacantBlock { x: 12, y: 0, z: 0 })
        ));
        assert!(map.mesh_unit(q, None).is_err());
        assert_eq!(map.voxel_value(q, None), (Voxel::ZERO, false));
    }

    #[test]
    fn test_current_entry_skips_lookup() {
        let mut map = map();
        let block = BlockCoord::new(0, 0, 0);
        let ptr = map.allocate_block(block).unwrap();
        let entry = HashEntry {
            pos: block,
            ptr,
            next: crate::memory::NONE,
        };

        map.mesh_unit_mut((block, CellCoord::new(0, 0, 0)), Some(&entry))
            .unwrap()
            .cube_index = 5;
        assert_eq!(
            map.mesh_unit((block, CellCoord::new(0, 0, 0)), Some(&entry))
                .unwrap()
                .cube_index,
            5
        );

        // An entry for another block falls back to the directory.
        let other = HashEntry {
            pos: BlockCoord::new(4, 4, 4),
            ..entry
        };
        assert!(map.voxel_ref(VoxelCoord::new(1, 1, 1), Some(&other)).is_ok());

        // A caller entry is trusted even if the directory disagrees.
        assert!(map.voxel_ref((other.pos, CellCoord::new(0, 0, 0)), None).is_err());
        assert!(map
            .voxel_ref((other.pos, CellCoord::new(0, 0, 0)), Some(&other))
            .is_ok());
    }
}
