//! Frame-by-frame mapping: allocate, compact, integrate, recycle.
//!
//! Each stage finishes before the next starts. Allocation and compaction
//! borrow the map shared and run in parallel; fusion and recycling borrow it
//! exclusively.

pub mod frame;
mod integrate;
pub mod stats;

pub use frame::DepthFrame;
pub use stats::FrameStats;

use crate::config::{FusionConfig, MapConfig};
use crate::error::Result;
use crate::map::VoxelMap;
use crate::memory::CandidateEntries;

/// Owns a [`VoxelMap`] and fuses depth frames into it.
pub struct MappingEngine {
    map: VoxelMap,
    fusion: FusionConfig,
    candidates: CandidateEntries,
    frame_count: u64,
}

impl MappingEngine {
    /// Create an engine with an empty map.
    ///
    /// # Errors
    /// `InvalidConfig` if either configuration fails validation.
    pub fn new(map_config: MapConfig, fusion: FusionConfig) -> Result<Self> {
        fusion.validate()?;
        let map = VoxelMap::new(map_config)?;
        Ok(Self {
            candidates: CandidateEntries::new(map.directory().entry_count()),
            map,
            fusion,
            frame_count: 0,
        })
    }

    /// Integrate one frame.
    ///
    /// # Errors
    /// `FrameSizeMismatch` for a malformed frame, or `PoolExhausted` /
    /// `DirectoryFull` when the allocation stage runs out of capacity. On a
    /// capacity error the frame is abandoned: blocks allocated so far stay,
    /// nothing is fused, and the frame is not counted.
    pub fn integrate(&mut self, frame: &DepthFrame) -> Result<FrameStats> {
        frame.validate()?;
        let truncation = self.fusion.truncation;

        let before = self.map.pool().in_use();
        if let Err(err) = integrate::allocate_frame(&self.map, frame, truncation) {
            log::warn!("frame {} abandoned during allocation: {}", self.frame_count, err);
            return Err(err);
        }
        let allocated = self.map.pool().in_use().saturating_sub(before);

        if self.candidates.capacity() != self.map.directory().entry_count() {
            self.candidates = CandidateEntries::new(self.map.directory().entry_count());
        }
        self.candidates.reset_count();
        let candidates =
            integrate::compact_visible(&self.map, frame, truncation, &self.candidates);
        log::debug!("frame {}: {} candidate blocks", self.frame_count, candidates);

        let updated_voxels =
            integrate::fuse_candidates(&mut self.map, &self.candidates, frame, &self.fusion);

        self.frame_count += 1;
        let interval = u64::from(self.fusion.recycle_interval);
        let recycled = if interval > 0 && self.frame_count % interval == 0 {
            self.recycle()
        } else {
            0
        };

        let stats = FrameStats {
            allocated,
            candidates,
            updated_voxels,
            recycled,
        };
        log::info!("frame {}: {}", self.frame_count, stats);
        Ok(stats)
    }

    /// Starve every block, then reclaim those the retention policy rejects.
    /// Returns the number of blocks reclaimed.
    pub fn recycle(&mut self) -> usize {
        self.map.starve(self.fusion.starve_amount);
        let recycled = self.map.collect_garbage(&self.fusion.retention);
        log::debug!(
            "recycle: {} blocks reclaimed, {} in use",
            recycled,
            self.map.pool().in_use()
        );
        recycled
    }

    /// Drop all content and restart frame counting.
    pub fn reset(&mut self) {
        self.map.reset();
        self.candidates.reset_count();
        self.frame_count = 0;
    }

    /// Frames integrated since creation or the last reset.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The map.
    #[inline]
    pub fn map(&self) -> &VoxelMap {
        &self.map
    }

    /// Mutable map, for voxel edits and mesh-unit updates between frames.
    #[inline]
    pub fn map_mut(&mut self) -> &mut VoxelMap {
        &mut self.map
    }

    /// Candidate blocks of the last integrated frame.
    #[inline]
    pub fn candidates(&self) -> &CandidateEntries {
        &self.candidates
    }

    /// Fusion parameters.
    #[inline]
    pub fn fusion_config(&self) -> &FusionConfig {
        &self.fusion
    }
}
