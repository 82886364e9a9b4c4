//! # vh_map
//!
//! Sparse voxel-hashed TSDF map: a lock-free spatial hash directory over a
//! fixed pool of voxel blocks, with per-frame compaction, garbage collection
//! and a depth-frame integration engine.
//!
//! ## Features
//!
//! - **Lock-free directory**: concurrent lookup and insert from rayon tasks,
//!   at most one entry per block coordinate
//! - **Bounded memory**: fixed block pool and fixed overflow region
//! - **Stage barriers in the type system**: `&self` stages run in parallel,
//!   `&mut self` stages (fusion, delete, GC sweep) run alone
//!
//! ## Usage
//!
//! ```
//! use vh_map::{MapConfig, VoxelMap};
//! use vh_core::{BlockCoord, VoxelCoord};
//!
//! let mut map = VoxelMap::new(MapConfig::new(64, 2, 64, 16)).unwrap();
//! let ptr = map.allocate_block(BlockCoord::new(0, 0, 0)).unwrap();
//! assert_eq!(map.lookup(BlockCoord::new(0, 0, 0)), Some(ptr));
//!
//! map.voxel_mut(VoxelCoord::new(1, 2, 3), None).unwrap().sdf = 0.5;
//! let (voxel, found) = map.voxel_value(VoxelCoord::new(1, 2, 3), None);
//! assert!(found && voxel.sdf == 0.5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod map;
pub mod memory;

pub use access::VoxelQuery;
pub use config::{FusionConfig, MapConfig, RetentionPolicy};
pub use engine::{DepthFrame, FrameStats, MappingEngine};
pub use error::{MapError, Result};
pub use map::VoxelMap;
pub use memory::{
    BatchLookupResult, BlockPool, CandidateEntries, HashDirectory, HashEntry, InsertOutcome,
    MeshUnit, Voxel,
};

// Re-export the math crate for convenience
pub use vh_core;
