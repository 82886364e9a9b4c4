//! Error types for vh_core.
//!
//! A plain enum with a hand-written `Display` so the crate stays `no_std`.

use core::fmt;

/// Errors raised by coordinate and key arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreError {
    /// A block coordinate falls outside the packable 21-bit signed range.
    CoordinateOutOfRange {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },
    /// Block edge length is zero or not a power of two.
    InvalidBlockDim {
        /// The rejected edge length.
        block_dim: u32,
    },
    /// Voxel size is not a positive finite number.
    InvalidVoxelSize {
        /// The rejected size.
        voxel_size: f32,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::CoordinateOutOfRange { x, y, z } => {
                write!(f, "block coordinate ({}, {}, {}) is out of range", x, y, z)
            }
            CoreError::InvalidBlockDim { block_dim } => {
                write!(f, "block dimension {} is not a power of two", block_dim)
            }
            CoreError::InvalidVoxelSize { voxel_size } => {
                write!(f, "voxel size {} must be positive and finite", voxel_size)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}
