//! Camera data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in camera_operations.rs

use cgmath::Point3;
use serde::{Deserialize, Serialize};

/// Viewpoint the embedding application renders from
#[derive(Debug, Clone, Copy)]
pub struct CameraData {
    /// Camera position in world space
    pub position: Point3<f32>,

    /// Yaw rotation (radians, around Y axis)
    pub yaw_radians: f32,

    /// Pitch rotation (radians, around X axis)
    pub pitch_radians: f32,

    /// Field of view (vertical, radians)
    pub fov_radians: f32,

    /// Aspect ratio (width / height)
    pub aspect_ratio: f32,

    pub near_plane: f32,
    pub far_plane: f32,
}

/// Frustum descriptor handed to the visual debugger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebugCamera {
    pub from: [f32; 3],
    pub to: [f32; 3],
    pub up: [f32; 3],
    pub near: f32,
    pub far: f32,
    /// Vertical field of view
    pub fov_degrees: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            yaw_radians: 0.0,
            pitch_radians: 0.0,
            fov_radians: 60.0_f32.to_radians(),
            aspect_ratio: 16.0 / 9.0,
            near_plane: 0.3,
            far_plane: 1000.0,
        }
    }
}
