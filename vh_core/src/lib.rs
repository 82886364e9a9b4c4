//! # vh_core
//!
//! Pure arithmetic for voxel-hashed TSDF maps.
//!
//! ## Features
//!
//! - **no_std compatible**: no allocation anywhere in this crate
//! - **Coordinate mapping**: world ↔ voxel ↔ block ↔ in-block offset
//! - **Spatial hashing**: deterministic bucket hash and injective 63-bit keys
//! - **Camera model**: pinhole projection and rigid poses
//!
//! ## Feature Flags
//!
//! - `std` (default): implements `std::error::Error` for [`CoreError`]
//! - `serde`: derives `Serialize`/`Deserialize` on the plain data types
//!
//! ## Usage
//!
//! ```
//! use vh_core::{CoordinateMapper, Point3, BlockCoord};
//!
//! let mapper = CoordinateMapper::new(0.05, 8).unwrap();
//! let block = mapper.world_to_block(Point3::new(0.5, -0.1, 1.0));
//! assert_eq!(block, BlockCoord::new(1, -1, 2));
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

pub mod camera;
pub mod coords;
pub mod error;
pub mod hash;
pub mod types;

/// Commonly used types and functions.
pub mod prelude {
    pub use crate::camera::CameraIntrinsics;
    pub use crate::coords::CoordinateMapper;
    pub use crate::error::CoreError;
    pub use crate::hash::{bucket_index, pack_block_key, unpack_block_key, VACANT_KEY};
    pub use crate::types::{BlockCoord, CellCoord, Point3, Pose, VoxelCoord};
}

pub use camera::CameraIntrinsics;
pub use coords::{
    block_to_voxel, block_to_world, offset_to_voxel, voxel_to_block, voxel_to_offset,
    voxel_to_world, world_to_block, world_to_voxel, CoordinateMapper,
};
pub use error::CoreError;
pub use hash::{
    bucket_index, compact_bits_3d, is_packable, pack_block_key, spatial_hash, spread_bits_3d,
    unpack_block_key, MAX_BLOCK_COORD, MIN_BLOCK_COORD, VACANT_KEY,
};
pub use types::{BlockCoord, CellCoord, Point3, Pose, VoxelCoord};
