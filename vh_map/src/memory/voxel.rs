//! Per-voxel payloads stored in the block pool.

/// One TSDF sample.
///
/// `a` and `b` accumulate inlier and outlier evidence for the fused surface.
/// The zero value is the "never observed" state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Voxel {
    /// Truncated signed distance to the nearest surface.
    pub sdf: f32,
    /// Accumulated fusion weight.
    pub weight: f32,
    /// Fused RGB color.
    pub color: [u8; 3],
    /// Inlier evidence.
    pub a: f32,
    /// Outlier evidence.
    pub b: f32,
}

impl Voxel {
    /// The never-observed voxel.
    pub const ZERO: Self = Self {
        sdf: 0.0,
        weight: 0.0,
        color: [0; 3],
        a: 0.0,
        b: 0.0,
    };

    /// True once any observation has been fused.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }

    /// Fuse one observation as a running weighted average.
    ///
    /// `sdf` is expected to be truncated already. The accumulated weight
    /// never exceeds `max_weight`.
    pub fn fuse(&mut self, sdf: f32, weight: f32, color: Option<[u8; 3]>, max_weight: f32) {
        let total = self.weight + weight;
        if total <= 0.0 {
            return;
        }
        self.sdf = (self.sdf * self.weight + sdf * weight) / total;
        if let Some(rgb) = color {
            for (c, &o) in self.color.iter_mut().zip(rgb.iter()) {
                let mixed = (*c as f32 * self.weight + o as f32 * weight) / total;
                *c = mixed.round().clamp(0.0, 255.0) as u8;
            }
        }
        self.weight = total.min(max_weight);
    }
}

/// Sentinel for an unassigned vertex or triangle slot.
pub const NO_SLOT: i32 = -1;

/// Per-cell state kept by the mesh extractor between frames.
///
/// The map only stores and clears it; its meaning belongs to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshUnit {
    /// Vertices owned by this cell on its three positive edges.
    pub vertex_ptrs: [i32; 3],
    /// Triangles emitted for this cell.
    pub triangle_ptrs: [i32; 5],
    /// Marching-cubes case of the current extraction.
    pub cube_index: u8,
    /// Marching-cubes case of the previous extraction.
    pub prev_cube_index: u8,
}

impl MeshUnit {
    /// A cell with no geometry.
    pub const EMPTY: Self = Self {
        vertex_ptrs: [NO_SLOT; 3],
        triangle_ptrs: [NO_SLOT; 5],
        cube_index: 0,
        prev_cube_index: 0,
    };

    /// Forget all geometry, keeping nothing from previous extractions.
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}

impl Default for MeshUnit {
    fn default() -> Self {
        Self::EMPTY
    }
}
