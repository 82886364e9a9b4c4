//! Pinhole depth-camera model.
//!
//! Camera frame convention: +x right, +y down, +z forward (optical axis).

use crate::types::Point3;

/// Pinhole intrinsics plus the valid depth range of the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraIntrinsics {
    /// Focal length along x, in pixels.
    pub fx: f32,
    /// Focal length along y, in pixels.
    pub fy: f32,
    /// Principal point x, in pixels.
    pub cx: f32,
    /// Principal point y, in pixels.
    pub cy: f32,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Depths below this are invalid.
    pub min_depth: f32,
    /// Depths above this are invalid.
    pub max_depth: f32,
}

impl CameraIntrinsics {
    /// Create intrinsics with the default 0.1 m to 5 m depth range.
    pub const fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            min_depth: 0.1,
            max_depth: 5.0,
        }
    }

    /// Intrinsics for a given horizontal field of view (radians), principal
    /// point at the image center and square pixels.
    pub fn from_fov(width: u32, height: u32, fov_h: f32) -> Self {
        let f = (width as f32 * 0.5) / libm::tanf(fov_h * 0.5);
        Self::new(
            f,
            f,
            (width as f32 - 1.0) * 0.5,
            (height as f32 - 1.0) * 0.5,
            width,
            height,
        )
    }

    /// Set the valid depth range.
    pub const fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Number of pixels.
    #[inline]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True if `depth` is inside the sensor range.
    #[inline]
    pub fn is_valid_depth(&self, depth: f32) -> bool {
        depth.is_finite() && depth >= self.min_depth && depth <= self.max_depth
    }

    /// Project a camera-frame point to continuous pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera.
    #[inline]
    pub fn project(&self, p: Point3) -> Option<(f32, f32)> {
        if p.z <= 0.0 {
            return None;
        }
        Some((self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy))
    }

    /// Project to the nearest pixel, if it lies inside the image.
    #[inline]
    pub fn project_to_pixel(&self, p: Point3) -> Option<(u32, u32)> {
        let (u, v) = self.project(p)?;
        let (u, v) = (libm::roundf(u), libm::roundf(v));
        if u < 0.0 || v < 0.0 || u >= self.width as f32 || v >= self.height as f32 {
            return None;
        }
        Some((u as u32, v as u32))
    }

    /// Back-project pixel `(u, v)` at `depth` along the optical axis.
    #[inline]
    pub fn backproject(&self, u: f32, v: f32, depth: f32) -> Point3 {
        Point3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }

    /// True if a camera-frame point projects inside the image and lies
    /// within the depth range expanded by `margin`.
    pub fn in_frustum(&self, p: Point3, margin: f32) -> bool {
        if p.z < self.min_depth - margin || p.z > self.max_depth + margin {
            return false;
        }
        match self.project(p) {
            Some((u, v)) => {
                let mu = margin * self.fx / p.z.max(self.min_depth);
                let mv = margin * self.fy / p.z.max(self.min_depth);
                u >= -mu
                    && v >= -mv
                    && u <= self.width as f32 - 1.0 + mu
                    && v <= self.height as f32 - 1.0 + mv
            }
            None => false,
        }
    }
}
