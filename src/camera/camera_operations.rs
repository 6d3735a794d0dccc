//! Camera operations - Pure DOP functions
//!
//! All functions are pure: they take data, return new data, no side effects.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3, Vector4};

use super::camera_data::{CameraData, DebugCamera};

// ============================================================================
// INITIALIZATION
// ============================================================================

pub fn init_camera(position: Point3<f32>, yaw: f32, pitch: f32) -> CameraData {
    CameraData {
        position,
        yaw_radians: yaw,
        pitch_radians: pitch,
        ..Default::default()
    }
}

/// Camera at `from` turned towards `target`
pub fn look_at(from: Point3<f32>, target: Point3<f32>) -> CameraData {
    let direction = target - from;
    if direction.magnitude2() <= f32::EPSILON {
        return init_camera(from, 0.0, 0.0);
    }
    let direction = direction.normalize();
    let pitch = direction.y.clamp(-1.0, 1.0).asin();
    let yaw = direction.z.atan2(direction.x);
    rotate(&init_camera(from, 0.0, 0.0), yaw, pitch)
}

// ============================================================================
// VIEW/PROJECTION MATRICES
// ============================================================================

pub fn build_view_matrix(camera: &CameraData) -> Matrix4<f32> {
    let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
    let target = camera.position + forward;
    Matrix4::look_at_rh(camera.position, target, Vector3::unit_y())
}

pub fn build_projection_matrix(camera: &CameraData) -> Matrix4<f32> {
    cgmath::perspective(
        Rad(camera.fov_radians),
        camera.aspect_ratio,
        camera.near_plane,
        camera.far_plane,
    )
}

/// Whether a sphere overlaps the camera frustum, tested in clip space
pub fn sphere_in_view(camera: &CameraData, center: Point3<f32>, radius: f32) -> bool {
    let view = build_view_matrix(camera);
    let view_space = view * center.to_homogeneous();
    let depth = -view_space.z;
    if depth + radius < camera.near_plane || depth - radius > camera.far_plane {
        return false;
    }

    let projection = build_projection_matrix(camera);
    let clip: Vector4<f32> = projection * view_space;
    if clip.w <= f32::EPSILON {
        // Centre behind the eye but the sphere reaches the near plane
        return true;
    }
    let margin = radius * projection.x.x / clip.w;
    let vertical_margin = radius * projection.y.y / clip.w;
    let (x, y) = (clip.x / clip.w, clip.y / clip.w);
    x.abs() <= 1.0 + margin && y.abs() <= 1.0 + vertical_margin
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// Rotate camera by yaw/pitch deltas (radians)
pub fn rotate(camera: &CameraData, yaw_delta: f32, pitch_delta: f32) -> CameraData {
    let mut new_camera = *camera;
    new_camera.yaw_radians += yaw_delta;
    new_camera.pitch_radians += pitch_delta;

    // Clamp pitch to avoid gimbal lock
    const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
    new_camera.pitch_radians = new_camera.pitch_radians.clamp(-PITCH_LIMIT, PITCH_LIMIT);

    new_camera
}

// ============================================================================
// UTILITIES
// ============================================================================

pub fn calculate_forward_vector(yaw: f32, pitch: f32) -> Vector3<f32> {
    Vector3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
}

/// Right-handed: forward x world up
pub fn calculate_right_vector(yaw: f32) -> Vector3<f32> {
    Vector3::new(-yaw.sin(), 0.0, yaw.cos())
}

pub fn calculate_up_vector(yaw: f32, pitch: f32) -> Vector3<f32> {
    let forward = calculate_forward_vector(yaw, pitch);
    let right = calculate_right_vector(yaw);
    right.cross(forward).normalize()
}

// ============================================================================
// DEBUGGER
// ============================================================================

/// Frustum descriptor one unit along the view direction
pub fn debug_camera_from_camera_data(camera: &CameraData) -> DebugCamera {
    let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
    let up = calculate_up_vector(camera.yaw_radians, camera.pitch_radians);
    let to = camera.position + forward;
    DebugCamera {
        from: camera.position.into(),
        to: to.into(),
        up: up.into(),
        near: camera.near_plane,
        far: camera.far_plane,
        fov_degrees: camera.fov_radians.to_degrees(),
    }
}

/// Camera the debugger uses when the application supplies none
pub fn default_debug_camera() -> DebugCamera {
    let camera = look_at(Point3::new(0.0, 10.0, -20.0), Point3::origin());
    debug_camera_from_camera_data(&camera)
}

/// Rebuild camera data from a frustum descriptor; aspect ratio is not carried
pub fn camera_data_from_debug_camera(camera: &DebugCamera) -> CameraData {
    let mut data = look_at(Point3::from(camera.from), Point3::from(camera.to));
    data.fov_radians = camera.fov_degrees.to_radians();
    data.near_plane = camera.near;
    data.far_plane = camera.far;
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_debug_camera_points_along_view() {
        let camera = init_camera(Point3::new(1.0, 2.0, 3.0), 0.0, 0.0);
        let debug = debug_camera_from_camera_data(&camera);
        assert_eq!(debug.from, [1.0, 2.0, 3.0]);
        assert!(approx(debug.to, [2.0, 2.0, 3.0]));
        assert!(approx(debug.up, [0.0, 1.0, 0.0]));
        assert!((debug.fov_degrees - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_look_at_round_trip() {
        let camera = look_at(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 5.0));
        let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
        assert!(approx(forward.into(), [0.0, 0.0, 1.0]));

        let debug = default_debug_camera();
        let rebuilt = camera_data_from_debug_camera(&debug);
        assert!(approx(debug_camera_from_camera_data(&rebuilt).to, debug.to));
    }

    #[test]
    fn test_sphere_in_view() {
        let camera = look_at(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
        assert!(sphere_in_view(&camera, Point3::new(10.0, 0.0, 0.0), 1.0));
        assert!(!sphere_in_view(&camera, Point3::new(-10.0, 0.0, 0.0), 1.0));
        assert!(!sphere_in_view(&camera, Point3::new(5000.0, 0.0, 0.0), 1.0));
        // Off to the side but large enough to reach into the frustum
        assert!(sphere_in_view(&camera, Point3::new(10.0, 0.0, 12.0), 8.0));
    }
}
