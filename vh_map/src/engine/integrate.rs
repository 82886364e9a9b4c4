//! Allocation and fusion stages of frame integration.

use rayon::prelude::*;
use vh_core::{BlockCoord, Point3};

use crate::config::FusionConfig;
use crate::engine::frame::DepthFrame;
use crate::error::{MapError, Result};
use crate::map::VoxelMap;
use crate::memory::{CandidateEntries, HashEntry};

/// Allocate every block within `truncation` of an observed surface point,
/// sampling each pixel ray at half-block steps. Runs one task per image row.
///
/// Only capacity errors abort the stage; coordinates that cannot be keyed
/// are skipped.
pub(crate) fn allocate_frame(map: &VoxelMap, frame: &DepthFrame, truncation: f32) -> Result<()> {
    let step = map.mapper.block_size() * 0.5;
    let origin = frame.origin();

    (0..frame.height).into_par_iter().try_for_each(|y| {
        let mut last: Option<BlockCoord> = None;
        for x in 0..frame.width {
            let Some(surface) = frame.point_at(x, y) else {
                continue;
            };
            let ray = surface - origin;
            let dist = ray.length();
            if dist <= 0.0 {
                continue;
            }
            let dir = ray / dist;
            let start = (dist - truncation).max(0.0);
            let end = dist + truncation;
            let steps = ((end - start) / step).ceil() as usize;

            for i in 0..=steps {
                let s = (start + i as f32 * step).min(end);
                let block = map.mapper.world_to_block(origin + dir * s);
                if last == Some(block) {
                    continue;
                }
                last = Some(block);
                match map.allocate_block(block) {
                    Ok(_) | Err(MapError::CoordinateOutOfRange { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    })
}

/// Write the occupied entries whose block touches the camera frustum into
/// `out`. Returns the candidate count.
pub(crate) fn compact_visible(
    map: &VoxelMap,
    frame: &DepthFrame,
    truncation: f32,
    out: &CandidateEntries,
) -> usize {
    // Half the block diagonal, so any block overlapping the frustum passes.
    let margin = map.mapper.block_size() * 0.5 * 3f32.sqrt() + truncation;
    let pose = frame.pose;
    let intrinsics = frame.intrinsics;
    map.compact_into(
        |e: &HashEntry| {
            let center = pose.inverse_transform_point(map.mapper.block_center(e.pos));
            intrinsics.in_frustum(center, margin)
        },
        out,
    )
}

/// Fuse `frame` into every candidate block, one task per block. Returns
/// the number of voxels updated.
pub(crate) fn fuse_candidates(
    map: &mut VoxelMap,
    candidates: &CandidateEntries,
    frame: &DepthFrame,
    config: &FusionConfig,
) -> usize {
    let capacity = map.pool.capacity();
    let mut owner: Vec<Option<BlockCoord>> = vec![None; capacity];
    for e in candidates.iter() {
        if let Some(slot) = owner.get_mut(e.ptr as usize) {
            *slot = Some(e.pos);
        }
    }
    let mask: Vec<bool> = owner.iter().map(Option::is_some).collect();

    let mapper = map.mapper;
    let truncation = config.truncation;
    let pose = frame.pose;
    let intrinsics = frame.intrinsics;

    map.pool
        .par_blocks_mut(&mask)
        .map(|block| {
            let Some(pos) = owner[block.index as usize] else {
                return 0;
            };
            let mut updated = 0;
            for (i, voxel) in block.voxels.iter_mut().enumerate() {
                let world: Point3 =
                    mapper.voxel_to_world(mapper.offset_to_voxel(pos, mapper.devectorize_offset(i)));
                let p_cam = pose.inverse_transform_point(world);
                let Some((u, v)) = intrinsics.project_to_pixel(p_cam) else {
                    continue;
                };
                let Some(depth) = frame.depth_at(u, v) else {
                    continue;
                };

                let sdf = depth - p_cam.z;
                if sdf < -truncation {
                    continue;
                }
                let color = if config.integrate_color {
                    frame.color_at(u, v)
                } else {
                    None
                };
                voxel.fuse(sdf.min(truncation), 1.0, color, config.max_weight);
                if sdf.abs() < truncation {
                    voxel.a += 1.0;
                } else {
                    voxel.b += 1.0;
                }
                updated += 1;
            }
            updated
        })
        .sum()
}
