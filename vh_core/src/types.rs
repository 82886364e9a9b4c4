//! Core coordinate types for the voxel-hashed map.
//!
//! Three integer lattices are in play: global voxel indices ([`VoxelCoord`]),
//! block coordinates ([`BlockCoord`]) and the voxel offset inside one block
//! ([`CellCoord`]). World space uses [`Point3`].

use core::ops::{Add, Div, Mul, Neg, Sub};

/// A 3D point (or vector) in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Point3 {
    /// Create a new Point3.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All components set to `v`.
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Convert to an array.
    #[inline]
    pub const fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Euclidean length.
    #[inline]
    pub fn length(self) -> f32 {
        libm::sqrtf(self.dot(self))
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::splat(0.0)
        } else {
            self / len
        }
    }
}

impl From<[f32; 3]> for Point3 {
    #[inline]
    fn from(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl Add for Point3 {
    type Output = Self;

    #[inline]
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    #[inline]
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Div<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn div(self, s: f32) -> Self {
        Self::new(self.x / s, self.y / s, self.z / s)
    }
}

impl Neg for Point3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Block coordinates in the sparse hash (signed, one unit per block edge).
///
/// Equality is exact integer comparison; this is the directory key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockCoord {
    /// X coordinate in block space.
    pub x: i32,
    /// Y coordinate in block space.
    pub y: i32,
    /// Z coordinate in block space.
    pub z: i32,
}

impl BlockCoord {
    /// Create a new BlockCoord.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert to an array.
    #[inline]
    pub const fn as_array(&self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Offset by a signed delta on each axis.
    #[inline]
    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl From<[i32; 3]> for BlockCoord {
    #[inline]
    fn from(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

/// Global voxel index (signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoxelCoord {
    /// X voxel index.
    pub x: i32,
    /// Y voxel index.
    pub y: i32,
    /// Z voxel index.
    pub z: i32,
}

impl VoxelCoord {
    /// Create a new VoxelCoord.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl From<[i32; 3]> for VoxelCoord {
    #[inline]
    fn from(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

/// Voxel offset within a block (0 to block_dim-1 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellCoord {
    /// X offset within the block.
    pub x: u32,
    /// Y offset within the block.
    pub y: u32,
    /// Z offset within the block.
    pub z: u32,
}

impl CellCoord {
    /// Create a new CellCoord.
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Linear offset: `x + y * dim + z * dim * dim`.
    #[inline]
    pub const fn flat_index(&self, block_dim: u32) -> usize {
        (self.x + self.y * block_dim + self.z * block_dim * block_dim) as usize
    }

    /// Inverse of [`CellCoord::flat_index`].
    #[inline]
    pub const fn from_flat_index(index: usize, block_dim: u32) -> Self {
        let index = index as u32;
        Self {
            x: index % block_dim,
            y: (index / block_dim) % block_dim,
            z: index / (block_dim * block_dim),
        }
    }

    /// True if every component is below `block_dim`.
    #[inline]
    pub const fn is_within(&self, block_dim: u32) -> bool {
        self.x < block_dim && self.y < block_dim && self.z < block_dim
    }
}

/// Rigid camera-to-world transform.
///
/// `rotation` is row-major; its columns are the camera's right, down and
/// forward axes expressed in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    /// Row-major rotation matrix.
    pub rotation: [[f32; 3]; 3],
    /// Camera center in world coordinates.
    pub translation: Point3,
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Pose = Pose {
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: Point3::new(0.0, 0.0, 0.0),
    };

    /// Create a pose from a rotation matrix and translation.
    #[inline]
    pub const fn new(rotation: [[f32; 3]; 3], translation: Point3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pure translation.
    #[inline]
    pub const fn from_translation(translation: Point3) -> Self {
        Self {
            rotation: Self::IDENTITY.rotation,
            translation,
        }
    }

    /// Camera at `eye` looking at `target`, with `up` as the world up hint.
    pub fn look_at(eye: Point3, target: Point3, up: Point3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(right).normalize();

        Self {
            rotation: [
                [right.x, down.x, forward.x],
                [right.y, down.y, forward.y],
                [right.z, down.z, forward.z],
            ],
            translation: eye,
        }
    }

    /// Camera frame to world frame.
    #[inline]
    pub fn transform_point(&self, p: Point3) -> Point3 {
        let r = &self.rotation;
        Point3::new(
            r[0][0] * p.x + r[0][1] * p.y + r[0][2] * p.z,
            r[1][0] * p.x + r[1][1] * p.y + r[1][2] * p.z,
            r[2][0] * p.x + r[2][1] * p.y + r[2][2] * p.z,
        ) + self.translation
    }

    /// World frame to camera frame.
    #[inline]
    pub fn inverse_transform_point(&self, p: Point3) -> Point3 {
        let r = &self.rotation;
        let d = p - self.translation;
        Point3::new(
            r[0][0] * d.x + r[1][0] * d.y + r[2][0] * d.z,
            r[0][1] * d.x + r[1][1] * d.y + r[2][1] * d.z,
            r[0][2] * d.x + r[1][2] * d.y + r[2][2] * d.z,
        )
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index_roundtrip() {
        for dim in [4u32, 8, 16] {
            for i in 0..(dim * dim * dim) as usize {
                let c = CellCoord::from_flat_index(i, dim);
                assert!(c.is_within(dim));
                assert_eq!(c.flat_index(dim), i);
            }
        }
    }

    #[test]
    fn flat_index_is_x_fastest() {
        assert_eq!(CellCoord::new(1, 0, 0).flat_index(8), 1);
        assert_eq!(CellCoord::new(0, 1, 0).flat_index(8), 8);
        assert_eq!(CellCoord::new(0, 0, 1).flat_index(8), 64);
    }

    #[test]
    fn pose_inverse_undoes_transform() {
        let pose = Pose::look_at(
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let p = Point3::new(0.3, -0.7, 2.5);
        let back = pose.inverse_transform_point(pose.transform_point(p));
        assert!((back - p).length() < 1e-5, "{:?} vs {:?}", back, p);
    }

    #[test]
    fn look_at_forward_is_camera_z() {
        let eye = Point3::new(0.0, 0.0, 2.0);
        let pose = Pose::look_at(eye, Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));

        // One unit ahead of the camera lands one unit closer to the origin.
        let ahead = pose.transform_point(Point3::new(0.0, 0.0, 1.0));
        assert!((ahead - Point3::new(0.0, 0.0, 1.0)).length() < 1e-6);

        // Camera +y points down in the world.
        let below = pose.transform_point(Point3::new(0.0, 1.0, 0.0));
        assert!(below.y < eye.y);
    }

    #[test]
    fn point_ops() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Point3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Point3::splat(3.0));
        assert_eq!(a.dot(b), 32.0);
        assert_eq!(a.cross(b), Point3::new(-3.0, 6.0, -3.0));
        assert!((Point3::new(3.0, 4.0, 0.0).length() - 5.0).abs() < 1e-6);
    }
}
