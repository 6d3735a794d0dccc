//! Body data structures - Pure DOP
//!
//! Every record here crosses the backend boundary, so each one is
//! `#[repr(C)]` and `Pod` with its size pinned below.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use static_assertions::assert_eq_size;

use crate::records::BodyIndexPair;

/// External identifier of the object that owns a body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Entity {
    pub index: i32,
    pub version: i32,
}

impl Entity {
    pub const NULL: Entity = Entity {
        index: -1,
        version: 0,
    };

    pub fn new(index: i32, version: i32) -> Self {
        Self { index, version }
    }
}

/// How a body participates in contact generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CollisionResponse {
    Collide = 0,
    RaiseTriggerEvents = 1,
    RaiseCollisionEvents = 2,
    None = 3,
}

impl CollisionResponse {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => CollisionResponse::RaiseTriggerEvents,
            2 => CollisionResponse::RaiseCollisionEvents,
            3 => CollisionResponse::None,
            _ => CollisionResponse::Collide,
        }
    }
}

/// A body in the engine's world. Colliders are spheres of `collider_radius`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RigidBody {
    pub entity: Entity,
    pub position: [f32; 3],
    pub collider_radius: f32,
    pub rotation: [f32; 4],
    /// Application tag bits, one byte used
    pub custom_tags: u32,
    /// Raw [`CollisionResponse`]
    pub collision_response: u32,
    pub friction: f32,
    pub restitution: f32,
}

impl RigidBody {
    pub fn sphere(entity: Entity, position: Vec3, radius: f32) -> Self {
        Self {
            entity,
            position: position.to_array(),
            collider_radius: radius,
            rotation: Quat::IDENTITY.to_array(),
            custom_tags: 0,
            collision_response: CollisionResponse::Collide as u32,
            friction: 0.5,
            restitution: 0.0,
        }
    }

    pub fn with_response(mut self, response: CollisionResponse) -> Self {
        self.collision_response = response as u32;
        self
    }

    pub fn response(&self) -> CollisionResponse {
        CollisionResponse::from_raw(self.collision_response)
    }
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::sphere(Entity::NULL, Vec3::ZERO, 0.5)
    }
}

/// Transform and damping of a dynamic body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MotionData {
    pub position: [f32; 3],
    pub linear_damping: f32,
    pub rotation: [f32; 4],
    pub angular_damping: f32,
    pub gravity_factor: f32,
    pub _padding: [f32; 2],
}

impl Default for MotionData {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            linear_damping: 0.01,
            rotation: Quat::IDENTITY.to_array(),
            angular_damping: 0.05,
            gravity_factor: 1.0,
            _padding: [0.0; 2],
        }
    }
}

/// Velocity and inverse mass properties of a dynamic body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MotionVelocity {
    pub linear: [f32; 3],
    pub inverse_mass: f32,
    pub angular: [f32; 3],
    pub _padding0: f32,
    /// Diagonal inverse inertia in motion space
    pub inverse_inertia: [f32; 3],
    pub _padding1: f32,
}

impl MotionVelocity {
    /// Solid sphere mass properties
    pub fn sphere(mass: f32, radius: f32) -> Self {
        let inverse_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        let inertia = 0.4 * mass * radius * radius;
        let inverse_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        Self {
            linear: [0.0; 3],
            inverse_mass,
            angular: [0.0; 3],
            _padding0: 0.0,
            inverse_inertia: [inverse_inertia; 3],
            _padding1: 0.0,
        }
    }

    pub fn with_linear(mut self, linear: Vec3) -> Self {
        self.linear = linear.to_array();
        self
    }
}

impl Default for MotionVelocity {
    fn default() -> Self {
        Self::sphere(1.0, 0.5)
    }
}

/// Velocity snapshot taken before the step
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Velocity {
    pub linear: [f32; 3],
    pub angular: [f32; 3],
}

impl Velocity {
    pub fn linear(&self) -> Vec3 {
        Vec3::from_array(self.linear)
    }

    pub fn angular(&self) -> Vec3 {
        Vec3::from_array(self.angular)
    }
}

/// Distance constraint between the centres of two bodies
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Joint {
    pub body_pair: BodyIndexPair,
    pub rest_length: f32,
    pub _padding: u32,
}

impl Joint {
    pub fn distance(body_a: i32, body_b: i32, rest_length: f32) -> Self {
        Self {
            body_pair: BodyIndexPair::new(body_a, body_b),
            rest_length,
            _padding: 0,
        }
    }
}

assert_eq_size!(Entity, [u8; 8]);
assert_eq_size!(RigidBody, [u8; 56]);
assert_eq_size!(MotionData, [u8; 48]);
assert_eq_size!(MotionVelocity, [u8; 48]);
assert_eq_size!(Velocity, [u8; 24]);
assert_eq_size!(Joint, [u8; 16]);
