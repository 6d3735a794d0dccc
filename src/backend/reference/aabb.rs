/// Axis-aligned bounds for the reference broadphase
///
/// Pure functions over plain data, no methods.

use cgmath::{Point3, Vector3};
use glam::Vec3;

use crate::config::WorldBounds;

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> AABB {
    AABB { min, max }
}

/// Bounds of a sphere grown by `margin` on every side
pub fn aabb_from_sphere(center: Vec3, radius: f32, margin: f32) -> AABB {
    let extent = radius + margin;
    let half_extents = Vector3::new(extent, extent, extent);
    let center = Point3::new(center.x, center.y, center.z);
    AABB {
        min: center - half_extents,
        max: center + half_extents,
    }
}

/// Grow `aabb` along the distance travelled in `dt`
pub fn aabb_swept(aabb: &AABB, velocity: Vec3, dt: f32) -> AABB {
    let travel = Vector3::new(velocity.x, velocity.y, velocity.z) * dt;
    let moved_min = aabb.min + travel;
    let moved_max = aabb.max + travel;
    AABB {
        min: Point3::new(
            aabb.min.x.min(moved_min.x),
            aabb.min.y.min(moved_min.y),
            aabb.min.z.min(moved_min.z),
        ),
        max: Point3::new(
            aabb.max.x.max(moved_max.x),
            aabb.max.y.max(moved_max.y),
            aabb.max.z.max(moved_max.z),
        ),
    }
}

pub fn aabb_intersects(aabb1: &AABB, aabb2: &AABB) -> bool {
    aabb1.min.x <= aabb2.max.x && aabb1.max.x >= aabb2.min.x &&
    aabb1.min.y <= aabb2.max.y && aabb1.max.y >= aabb2.min.y &&
    aabb1.min.z <= aabb2.max.z && aabb1.max.z >= aabb2.min.z
}

/// Non-finite bounds never intersect anything
pub fn aabb_is_finite(aabb: &AABB) -> bool {
    [aabb.min.x, aabb.min.y, aabb.min.z, aabb.max.x, aabb.max.y, aabb.max.z]
        .iter()
        .all(|v| v.is_finite())
}

pub fn world_bounds_aabb(bounds: &WorldBounds) -> AABB {
    create_aabb(
        Point3::new(bounds.min[0], bounds.min[1], bounds.min[2]),
        Point3::new(bounds.max[0], bounds.max[1], bounds.max[2]),
    )
}
