/// Camera Module - Data-Oriented Programming (DOP) style
///
/// - camera_data.rs: Pure data structures with NO methods
/// - camera_operations.rs: Pure functions that operate on data
///
/// The physics layer uses a camera only to tell the visual debugger where
/// the viewer is.

pub mod camera_data;
pub mod camera_operations;

pub use camera_data::{CameraData, DebugCamera};

pub use camera_operations::{
    build_projection_matrix, build_view_matrix, calculate_forward_vector, calculate_right_vector,
    calculate_up_vector, camera_data_from_debug_camera, debug_camera_from_camera_data,
    default_debug_camera, init_camera, look_at, rotate, sphere_in_view,
};
