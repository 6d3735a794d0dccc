/// Body Module - engine-owned world state handed to the step pipeline
///
/// - body_data.rs: Pod records for bodies, motions and joints
/// - physics_world.rs: the dynamic-first body container
/// - strided.rs: explicit-stride views for heterogeneous source layouts

pub mod body_data;
pub mod physics_world;
pub mod strided;

pub use body_data::{
    CollisionResponse, Entity, Joint, MotionData, MotionVelocity, RigidBody, Velocity,
};
pub use physics_world::{create_shared_world, PhysicsWorld, SharedPhysicsWorld};
pub use strided::StridedSlice;
