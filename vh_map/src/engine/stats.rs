//! Per-frame integration statistics.

use std::fmt;

/// What one [`integrate`](super::MappingEngine::integrate) call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Blocks newly allocated by the allocation stage.
    pub allocated: usize,
    /// Occupied blocks inside the camera frustum.
    pub candidates: usize,
    /// Voxels that received an observation.
    pub updated_voxels: usize,
    /// Blocks reclaimed by recycling (zero on frames without a recycle).
    pub recycled: usize,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} allocated, {} candidates, {} voxels updated, {} recycled",
            self.allocated, self.candidates, self.updated_voxels, self.recycled
        )
    }
}
