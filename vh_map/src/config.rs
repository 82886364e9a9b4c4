//! Map and fusion configuration (immutable after construction).

use vh_core::{CoordinateMapper, MAX_BLOCK_COORD, MIN_BLOCK_COORD};

use crate::error::{MapError, Result};
use crate::memory::Voxel;

/// `u32::MAX` marks vacant and end-of-chain slots, so entry and block
/// indices must stay below it.
const MAX_INDEX: usize = (u32::MAX - 1) as usize;

/// Sizing of the hash directory and block pool, plus the voxel lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapConfig {
    /// Number of hash buckets.
    pub bucket_count: usize,
    /// Primary slots per bucket.
    pub bucket_size: usize,
    /// Shared overflow entries linked into bucket chains on collision.
    pub overflow_capacity: usize,
    /// Maximum number of resident blocks.
    pub block_capacity: usize,
    /// Voxels per block edge (power of two).
    pub block_dim: u32,
    /// World units per voxel.
    pub voxel_size: f32,
}

impl MapConfig {
    /// Create a map configuration.
    ///
    /// # Arguments
    /// * `bucket_count` - Number of hash buckets
    /// * `bucket_size` - Primary slots per bucket
    /// * `overflow_capacity` - Entries in the shared overflow region
    /// * `block_capacity` - Blocks in the pool
    #[inline]
    pub const fn new(
        bucket_count: usize,
        bucket_size: usize,
        overflow_capacity: usize,
        block_capacity: usize,
    ) -> Self {
        Self {
            bucket_count,
            bucket_size,
            overflow_capacity,
            block_capacity,
            block_dim: 8,
            voxel_size: 0.01,
        }
    }

    /// Set the voxel lattice.
    #[inline]
    pub const fn with_voxels(mut self, block_dim: u32, voxel_size: f32) -> Self {
        self.block_dim = block_dim;
        self.voxel_size = voxel_size;
        self
    }

    /// Set the block pool capacity.
    #[inline]
    pub const fn with_block_capacity(mut self, block_capacity: usize) -> Self {
        self.block_capacity = block_capacity;
        self
    }

    /// Total directory entries (bucket region + overflow region).
    #[inline]
    pub const fn entry_count(&self) -> usize {
        self.bucket_count * self.bucket_size + self.overflow_capacity
    }

    /// Voxels per block (`block_dim³`).
    #[inline]
    pub const fn voxels_per_block(&self) -> usize {
        let d = self.block_dim as usize;
        d * d * d
    }

    /// Block edge length in world units.
    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_dim as f32 * self.voxel_size
    }

    /// Coordinate mapper for this lattice.
    pub fn mapper(&self) -> Result<CoordinateMapper> {
        Ok(CoordinateMapper::new(self.voxel_size, self.block_dim)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(MapError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.bucket_count == 0 {
            return invalid("bucket_count must be positive");
        }
        if self.bucket_size == 0 {
            return invalid("bucket_size must be positive");
        }
        if self.block_capacity == 0 {
            return invalid("block_capacity must be positive");
        }
        if self
            .bucket_count
            .checked_mul(self.bucket_size)
            .and_then(|n| n.checked_add(self.overflow_capacity))
            .map_or(true, |n| n > MAX_INDEX)
        {
            return invalid("directory entry count exceeds u32 index space");
        }
        if self.block_capacity > MAX_INDEX {
            return invalid("block_capacity exceeds u32 index space");
        }
        self.mapper()?;

        let dim = self.block_dim as usize;
        let Some(per_block) = dim.checked_mul(dim).and_then(|n| n.checked_mul(dim)) else {
            return invalid("block_dim^3 overflows");
        };
        if self.block_capacity.checked_mul(per_block).is_none() {
            return invalid("block_capacity * block_dim^3 overflows");
        }
        // Every voxel of every packable block must have an i32 index.
        let voxel_range = i32::try_from(self.block_dim).ok().and_then(|d| {
            MIN_BLOCK_COORD.checked_mul(d)?;
            MAX_BLOCK_COORD.checked_mul(d)?.checked_add(d - 1)
        });
        if voxel_range.is_none() {
            return invalid("block_dim too large for i32 voxel indices");
        }
        Ok(())
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new(1 << 16, 2, 1 << 15, 8192)
    }
}

/// When a block is worth keeping during garbage collection.
///
/// A block is retained iff its largest voxel weight is positive and at least
/// `min_weight`, and the smallest `|sdf|` among its weighted voxels is below
/// `sdf_threshold`. Observed free space far from any surface fails the
/// second test.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetentionPolicy {
    /// Minimum of the block's largest voxel weight.
    pub min_weight: f32,
    /// Blocks whose weighted voxels all have `|sdf| >= sdf_threshold` are dropped.
    pub sdf_threshold: f32,
}

impl RetentionPolicy {
    /// Create a retention policy.
    #[inline]
    pub const fn new(min_weight: f32, sdf_threshold: f32) -> Self {
        Self {
            min_weight,
            sdf_threshold,
        }
    }

    /// Evaluate the policy over one block's voxels.
    pub fn retains(&self, voxels: &[Voxel]) -> bool {
        let mut max_weight = 0.0f32;
        let mut min_abs_sdf = f32::INFINITY;
        for v in voxels.iter().filter(|v| v.weight > 0.0) {
            max_weight = max_weight.max(v.weight);
            min_abs_sdf = min_abs_sdf.min(v.sdf.abs());
        }
        max_weight > 0.0 && max_weight >= self.min_weight && min_abs_sdf < self.sdf_threshold
    }
}

/// TSDF fusion and recycling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusionConfig {
    /// Truncation distance μ in world units.
    pub truncation: f32,
    /// Upper bound on accumulated voxel weight.
    pub max_weight: f32,
    /// Recycle every this many integrated frames (0 disables recycling).
    pub recycle_interval: u32,
    /// Weight removed from every voxel before each garbage collection.
    pub starve_amount: f32,
    /// Garbage collection retention policy.
    pub retention: RetentionPolicy,
    /// Fuse color along with distance.
    pub integrate_color: bool,
}

impl FusionConfig {
    /// Create a fusion configuration for truncation distance `truncation`.
    #[inline]
    pub const fn new(truncation: f32) -> Self {
        Self {
            truncation,
            max_weight: 255.0,
            recycle_interval: 10,
            starve_amount: 1.0,
            retention: RetentionPolicy::new(0.5, truncation),
            integrate_color: true,
        }
    }

    /// Set the recycling cadence and starvation amount.
    #[inline]
    pub const fn with_recycling(mut self, interval: u32, starve_amount: f32) -> Self {
        self.recycle_interval = interval;
        self.starve_amount = starve_amount;
        self
    }

    /// Set the retention policy.
    #[inline]
    pub const fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set the weight cap.
    #[inline]
    pub const fn with_max_weight(mut self, max_weight: f32) -> Self {
        self.max_weight = max_weight;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.truncation <= 0.0 || !self.truncation.is_finite() {
            return Err(MapError::InvalidConfig {
                message: "truncation must be positive and finite".to_string(),
            });
        }
        if self.max_weight.is_nan() || self.max_weight <= 0.0 {
            return Err(MapError::InvalidConfig {
                message: "max_weight must be positive".to_string(),
            });
        }
        if self.starve_amount < 0.0 || !self.starve_amount.is_finite() {
            return Err(MapError::InvalidConfig {
                message: "starve_amount must be finite and not negative".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::new(0.04)
    }
}
