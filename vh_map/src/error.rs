//! Error types for vh_map.
//!
//! Capacity errors (`DirectoryFull`, `PoolExhausted`) are fatal for the
//! current frame. A lost insertion race is not an error at all; see
//! [`InsertOutcome::Duplicate`](crate::memory::InsertOutcome::Duplicate).

use thiserror::Error;
use vh_core::{BlockCoord, CoreError};

/// Errors that can occur during map operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    /// Both the bucket's primary slots and the overflow region are used up.
    #[error("hash directory full: no slot left for block ({x}, {y}, {z})")]
    DirectoryFull {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },

    /// Every block in the pool is in use.
    #[error("block pool exhausted: all {capacity} blocks are in use")]
    PoolExhausted {
        /// Pool capacity.
        capacity: usize,
    },

    /// A reference was requested for a block that is not allocated.
    #[error("invariant violation: block ({x}, {y}, {z}) is not allocated")]
    VacantBlock {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },

    /// Delete target is not in the directory.
    #[error("block ({x}, {y}, {z}) not found")]
    NotFound {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },

    /// Block coordinate cannot be packed into a directory key.
    #[error("block coordinate ({x}, {y}, {z}) is out of range")]
    CoordinateOutOfRange {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Depth or color buffer does not match the frame dimensions.
    #[error("frame buffer has {got} pixels, expected {expected}")]
    FrameSizeMismatch {
        /// Pixels implied by the intrinsics.
        expected: usize,
        /// Pixels in the buffer.
        got: usize,
    },
}

impl MapError {
    pub(crate) fn vacant(pos: BlockCoord) -> Self {
        MapError::VacantBlock {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }

    pub(crate) fn not_found(pos: BlockCoord) -> Self {
        MapError::NotFound {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }

    pub(crate) fn directory_full(pos: BlockCoord) -> Self {
        MapError::DirectoryFull {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }

    /// True for the capacity conditions that abort a frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MapError::DirectoryFull { .. } | MapError::PoolExhausted { .. })
    }
}

impl From<CoreError> for MapError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CoordinateOutOfRange { x, y, z } => {
                MapError::CoordinateOutOfRange { x, y, z }
            }
            other => MapError::InvalidConfig {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for vh_map operations.
pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapError::PoolExhausted { capacity: 16 };
        assert_eq!(err.to_string(), "block pool exhausted: all 16 blocks are in use");

        let err = MapError::directory_full(BlockCoord::new(1, -2, 3));
        assert!(err.to_string().contains("(1, -2, 3)"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(MapError::PoolExhausted { capacity: 1 }.is_fatal());
        assert!(MapError::directory_full(BlockCoord::default()).is_fatal());
        assert!(!MapError::not_found(BlockCoord::default()).is_fatal());
        assert!(!MapError::vacant(BlockCoord::default()).is_fatal());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: MapError = CoreError::CoordinateOutOfRange { x: 1, y: 2, z: 3 }.into();
        assert_eq!(err, MapError::CoordinateOutOfRange { x: 1, y: 2, z: 3 });

        let err: MapError = CoreError::InvalidBlockDim { block_dim: 3 }.into();
        assert!(matches!(err, MapError::InvalidConfig { .. }));
    }
}
