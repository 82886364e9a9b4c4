//! Input frames for integration.

use vh_core::{CameraIntrinsics, Point3, Pose};

use crate::error::{MapError, Result};

/// A registered depth frame with optional color.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth along the optical axis (row-major, `[y * width + x]`).
    /// Non-finite or out-of-range values are ignored.
    pub depth: Vec<f32>,
    /// Per-pixel RGB, same layout as `depth`.
    pub color: Option<Vec<[u8; 3]>>,
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Camera-to-world pose.
    pub pose: Pose,
}

impl DepthFrame {
    /// Create a frame sized by `intrinsics`.
    ///
    /// # Errors
    /// `FrameSizeMismatch` if `depth` does not have one value per pixel.
    pub fn new(intrinsics: CameraIntrinsics, pose: Pose, depth: Vec<f32>) -> Result<Self> {
        let frame = Self {
            width: intrinsics.width,
            height: intrinsics.height,
            depth,
            color: None,
            intrinsics,
            pose,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Attach a color image.
    ///
    /// # Errors
    /// `FrameSizeMismatch` if `color` does not have one value per pixel.
    pub fn with_color(mut self, color: Vec<[u8; 3]>) -> Result<Self> {
        self.color = Some(color);
        self.validate()?;
        Ok(self)
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check buffer sizes against the frame and intrinsics dimensions.
    pub fn validate(&self) -> Result<()> {
        let expected = self.pixel_count();
        if self.width != self.intrinsics.width || self.height != self.intrinsics.height {
            return Err(MapError::FrameSizeMismatch {
                expected: self.intrinsics.pixel_count(),
                got: expected,
            });
        }
        if self.depth.len() != expected {
            return Err(MapError::FrameSizeMismatch {
                expected,
                got: self.depth.len(),
            });
        }
        if let Some(color) = &self.color {
            if color.len() != expected {
                return Err(MapError::FrameSizeMismatch {
                    expected,
                    got: color.len(),
                });
            }
        }
        Ok(())
    }

    /// Depth at pixel `(x, y)`, if inside the image and the sensor range.
    #[inline]
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let d = *self.depth.get((y * self.width + x) as usize)?;
        self.intrinsics.is_valid_depth(d).then_some(d)
    }

    /// Color at pixel `(x, y)`.
    #[inline]
    pub fn color_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.color
            .as_ref()?
            .get((y * self.width + x) as usize)
            .copied()
    }

    /// Number of pixels with a usable depth.
    pub fn valid_count(&self) -> usize {
        self.depth
            .iter()
            .filter(|&&d| self.intrinsics.is_valid_depth(d))
            .count()
    }

    /// World-space point observed at pixel `(x, y)`.
    #[inline]
    pub fn point_at(&self, x: u32, y: u32) -> Option<Point3> {
        let d = self.depth_at(x, y)?;
        Some(
            self.pose
                .transform_point(self.intrinsics.backproject(x as f32, y as f32, d)),
        )
    }

    /// Camera center in world coordinates.
    #[inline]
    pub fn origin(&self) -> Point3 {
        self.pose.translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(10.0, 10.0, 1.5, 1.5, 4, 4)
    }

    #[test]
    fn test_size_validation() {
        assert!(DepthFrame::new(intrinsics(), Pose::IDENTITY, vec![1.0; 16]).is_ok());
        assert_eq!(
            DepthFrame::new(intrinsics(), Pose::IDENTITY, vec![1.0; 15]).unwrap_err(),
            MapError::FrameSizeMismatch {
                expected: 16,
                got: 15
            }
        );

        let frame = DepthFrame::new(intrinsics(), Pose::IDENTITY, vec![1.0; 16]).unwrap();
        assert!(frame.clone().with_color(vec![[0; 3]; 16]).is_ok());
        assert!(frame.with_color(vec![[0; 3]; 3]).is_err());
    }

    #[test]
    fn test_invalid_depths_are_skipped() {
        let mut depth = vec![1.0; 16];
        depth[0] = 0.0;
        depth[1] = f32::NAN;
        depth[2] = 50.0;
        let frame = DepthFrame::new(intrinsics(), Pose::IDENTITY, depth).unwrap();
        assert_eq!(frame.valid_count(), 13);
        assert_eq!(frame.depth_at(0, 0), None);
        assert_eq!(frame.depth_at(3, 3), Some(1.0));
        assert_eq!(frame.depth_at(4, 0), None);
        assert_eq!(frame.color_at(3, 3), None);
    }

    #[test]
    fn test_point_at_uses_pose() {
        let pose = Pose::from_translation(Point3::new(1.0, 0.0, 0.0));
        let frame = DepthFrame::new(intrinsics(), pose, vec![2.0; 16]).unwrap();
        let p = frame.point_at(1, 1).unwrap();
        assert!((p.x - 0.9).abs() < 1e-6);
        assert!((p.y + 0.1).abs() < 1e-6);
        assert!((p.z - 2.0).abs() < 1e-6);
    }
}
