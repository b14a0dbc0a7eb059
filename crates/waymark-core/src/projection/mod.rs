use nalgebra::{Matrix4, Perspective3, Point3};

use crate::contracts::Pose;

/// Near plane used for every visibility projection.
pub const NEAR_PLANE: f32 = 0.01;

/// Far plane used for every visibility projection.
///
/// Deliberately fixed at 30 m even when the render distance is larger; the
/// offscreen indicator was tuned against this volume.
pub const FAR_PLANE: f32 = 30.0;

/// A point after perspective division. Visible points lie in `[-1, 1]` on
/// each axis; `z > 1` means the point is behind the camera in this
/// convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdcPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Which edge of the screen a hidden point has left through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffscreenDirection {
    Left,
    Right,
    None,
}

impl NdcPoint {
    /// True iff the point lies inside the view volume in front of the camera.
    pub fn in_frustum(&self) -> bool {
        (-1.0..=1.0).contains(&self.x) && (-1.0..=1.0).contains(&self.y) && self.z <= 1.0
    }

    /// Screen edge to steer the user towards for an out-of-view point.
    ///
    /// Behind the camera the perspective division flips the sign of x, so the
    /// branch is mirrored relative to the in-front case. Keep the asymmetry:
    /// it is what makes the indicator stable when a point crosses behind the
    /// viewer.
    pub fn offscreen_direction(&self) -> OffscreenDirection {
        if self.z > 1.0 {
            if self.x > 0.0 {
                OffscreenDirection::Left
            } else {
                OffscreenDirection::Right
            }
        } else if self.x > 1.0 {
            OffscreenDirection::Right
        } else if self.x < -1.0 {
            OffscreenDirection::Left
        } else {
            OffscreenDirection::None
        }
    }
}

/// Projects world-space points into normalized device coordinates using the
/// camera's current view and projection matrices.
#[derive(Debug, Clone)]
pub struct PoseProjector {
    view_projection: Matrix4<f32>,
}

impl PoseProjector {
    /// Builds a projector from explicit view and projection matrices.
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        Self {
            view_projection: projection * view,
        }
    }

    /// Builds a projector for the given camera pose with the fixed
    /// near/far planes of this module.
    pub fn from_camera(camera: &Pose, fov_y_radians: f32, aspect_ratio: f32) -> Self {
        let projection =
            Perspective3::new(aspect_ratio, fov_y_radians, NEAR_PLANE, FAR_PLANE)
                .to_homogeneous();
        let view = camera.to_isometry().inverse().to_homogeneous();
        Self::new(view, projection)
    }

    /// Normalized device coordinates of a world-space point.
    pub fn ndc(&self, world: &Point3<f32>) -> NdcPoint {
        let clip = self.view_projection * world.to_homogeneous();
        NdcPoint {
            x: clip.x / clip.w,
            y: clip.y / clip.w,
            z: clip.z / clip.w,
        }
    }

    pub fn is_in_frustum(&self, world: &Point3<f32>) -> bool {
        self.ndc(world).in_frustum()
    }

    pub fn offscreen_direction(&self, world: &Point3<f32>) -> OffscreenDirection {
        self.ndc(world).offscreen_direction()
    }
}
