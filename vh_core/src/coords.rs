//! Coordinate mapping between world space, voxels and blocks.
//!
//! Voxel `v` is centered at `v * voxel_size`, so world points round to the
//! nearest voxel. Blocks are `block_dim` voxels per edge; block `b` covers
//! voxels `[b * block_dim, (b + 1) * block_dim)` on each axis. Negative
//! coordinates use floor division so the lattice has no seam at the origin.

use crate::error::CoreError;
use crate::types::{BlockCoord, CellCoord, Point3, VoxelCoord};

/// Round a world point to the nearest voxel index.
#[inline]
pub fn world_to_voxel(point: Point3, voxel_size: f32) -> VoxelCoord {
    VoxelCoord::new(
        libm::roundf(point.x / voxel_size) as i32,
        libm::roundf(point.y / voxel_size) as i32,
        libm::roundf(point.z / voxel_size) as i32,
    )
}

/// World position of a voxel center.
#[inline]
pub fn voxel_to_world(voxel: VoxelCoord, voxel_size: f32) -> Point3 {
    Point3::new(
        voxel.x as f32 * voxel_size,
        voxel.y as f32 * voxel_size,
        voxel.z as f32 * voxel_size,
    )
}

/// Block containing a voxel.
#[inline]
pub fn voxel_to_block(voxel: VoxelCoord, block_dim: u32) -> BlockCoord {
    let d = block_dim as i32;
    BlockCoord::new(
        voxel.x.div_euclid(d),
        voxel.y.div_euclid(d),
        voxel.z.div_euclid(d),
    )
}

/// First voxel (lowest corner) of a block.
#[inline]
pub fn block_to_voxel(block: BlockCoord, block_dim: u32) -> VoxelCoord {
    let d = block_dim as i32;
    VoxelCoord::new(block.x * d, block.y * d, block.z * d)
}

/// Offset of `voxel` inside `block`.
///
/// The result is only meaningful when `voxel` lies in `block`; use
/// [`voxel_to_block`] first.
#[inline]
pub fn voxel_to_offset(block: BlockCoord, voxel: VoxelCoord, block_dim: u32) -> CellCoord {
    let base = block_to_voxel(block, block_dim);
    CellCoord::new(
        (voxel.x - base.x) as u32,
        (voxel.y - base.y) as u32,
        (voxel.z - base.z) as u32,
    )
}

/// Global voxel index of `offset` inside `block`.
#[inline]
pub fn offset_to_voxel(block: BlockCoord, offset: CellCoord, block_dim: u32) -> VoxelCoord {
    let base = block_to_voxel(block, block_dim);
    VoxelCoord::new(
        base.x + offset.x as i32,
        base.y + offset.y as i32,
        base.z + offset.z as i32,
    )
}

/// Block containing a world point.
#[inline]
pub fn world_to_block(point: Point3, voxel_size: f32, block_dim: u32) -> BlockCoord {
    voxel_to_block(world_to_voxel(point, voxel_size), block_dim)
}

/// World position of a block's first voxel center.
#[inline]
pub fn block_to_world(block: BlockCoord, voxel_size: f32, block_dim: u32) -> Point3 {
    voxel_to_world(block_to_voxel(block, block_dim), voxel_size)
}

/// Immutable voxel size + block edge pair with the mapping functions as methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    voxel_size: f32,
    block_dim: u32,
}

impl CoordinateMapper {
    /// Create a mapper. `block_dim` must be a non-zero power of two and
    /// `voxel_size` positive.
    pub fn new(voxel_size: f32, block_dim: u32) -> Result<Self, CoreError> {
        if block_dim == 0 || !block_dim.is_power_of_two() {
            return Err(CoreError::InvalidBlockDim { block_dim });
        }
        if voxel_size <= 0.0 || !voxel_size.is_finite() {
            return Err(CoreError::InvalidVoxelSize { voxel_size });
        }
        Ok(Self {
            voxel_size,
            block_dim,
        })
    }

    /// World units per voxel.
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Voxels per block edge.
    #[inline]
    pub fn block_dim(&self) -> u32 {
        self.block_dim
    }

    /// Voxels per block (`block_dim³`).
    #[inline]
    pub fn voxels_per_block(&self) -> usize {
        let d = self.block_dim as usize;
        d * d * d
    }

    /// Block edge length in world units.
    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_dim as f32 * self.voxel_size
    }

    /// See [`world_to_voxel`].
    #[inline]
    pub fn world_to_voxel(&self, p: Point3) -> VoxelCoord {
        world_to_voxel(p, self.voxel_size)
    }

    /// See [`voxel_to_world`].
    #[inline]
    pub fn voxel_to_world(&self, v: VoxelCoord) -> Point3 {
        voxel_to_world(v, self.voxel_size)
    }

    /// See [`voxel_to_block`].
    #[inline]
    pub fn voxel_to_block(&self, v: VoxelCoord) -> BlockCoord {
        voxel_to_block(v, self.block_dim)
    }

    /// See [`block_to_voxel`].
    #[inline]
    pub fn block_to_voxel(&self, b: BlockCoord) -> VoxelCoord {
        block_to_voxel(b, self.block_dim)
    }

    /// See [`voxel_to_offset`].
    #[inline]
    pub fn voxel_to_offset(&self, b: BlockCoord, v: VoxelCoord) -> CellCoord {
        voxel_to_offset(b, v, self.block_dim)
    }

    /// See [`offset_to_voxel`].
    #[inline]
    pub fn offset_to_voxel(&self, b: BlockCoord, offset: CellCoord) -> VoxelCoord {
        offset_to_voxel(b, offset, self.block_dim)
    }

    /// See [`world_to_block`].
    #[inline]
    pub fn world_to_block(&self, p: Point3) -> BlockCoord {
        world_to_block(p, self.voxel_size, self.block_dim)
    }

    /// See [`block_to_world`].
    #[inline]
    pub fn block_to_world(&self, b: BlockCoord) -> Point3 {
        block_to_world(b, self.voxel_size, self.block_dim)
    }

    /// Linear index of a voxel within its block.
    #[inline]
    pub fn vectorize_offset(&self, offset: CellCoord) -> usize {
        offset.flat_index(self.block_dim)
    }

    /// Inverse of [`CoordinateMapper::vectorize_offset`].
    #[inline]
    pub fn devectorize_offset(&self, index: usize) -> CellCoord {
        CellCoord::from_flat_index(index, self.block_dim)
    }

    /// Decompose a voxel into (block, linear offset).
    #[inline]
    pub fn locate_voxel(&self, v: VoxelCoord) -> (BlockCoord, usize) {
        let block = self.voxel_to_block(v);
        let offset = self.voxel_to_offset(block, v);
        (block, self.vectorize_offset(offset))
    }

    /// Center of a block's voxel lattice in world space.
    #[inline]
    pub fn block_center(&self, b: BlockCoord) -> Point3 {
        let half = (self.block_dim as f32 - 1.0) * 0.5 * self.voxel_size;
        self.block_to_world(b) + Point3::splat(half)
    }
}
