//! PhysicsWorld - the engine-side body buffers handed to a step
//!
//! Bodies are stored dynamic-first: indices `0..num_dynamic_bodies` have a
//! matching entry in `motion_datas` and `motion_velocities`, the remaining
//! indices are static.

use std::sync::Arc;

use parking_lot::RwLock;

use super::body_data::{Entity, Joint, MotionData, MotionVelocity, RigidBody};
use crate::error::{PhysicsError, PhysicsResult};

/// Body, motion and joint buffers of one simulated world
#[derive(Debug, Clone, Default)]
pub struct PhysicsWorld {
    pub bodies: Vec<RigidBody>,
    pub motion_datas: Vec<MotionData>,
    pub motion_velocities: Vec<MotionVelocity>,
    pub joints: Vec<Joint>,
}

/// Thread-safe shared world buffers
pub type SharedPhysicsWorld = Arc<RwLock<PhysicsWorld>>;

/// Create thread-safe shared world buffers
pub fn create_shared_world(world: PhysicsWorld) -> SharedPhysicsWorld {
    Arc::new(RwLock::new(world))
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// World populated with default bodies and joints
    pub fn with_body_counts(num_static: usize, num_dynamic: usize, num_joints: usize) -> Self {
        Self {
            bodies: vec![RigidBody::default(); num_static + num_dynamic],
            motion_datas: vec![MotionData::default(); num_dynamic],
            motion_velocities: vec![MotionVelocity::default(); num_dynamic],
            joints: vec![Joint::distance(-1, -1, 0.0); num_joints],
        }
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn num_dynamic_bodies(&self) -> usize {
        self.motion_datas.len()
    }

    pub fn num_static_bodies(&self) -> usize {
        self.bodies.len().saturating_sub(self.motion_datas.len())
    }

    /// Motion arrays must agree with each other and fit inside the body list
    pub fn validate(&self) -> PhysicsResult<()> {
        if self.motion_velocities.len() != self.motion_datas.len() {
            return Err(PhysicsError::BufferTooSmall {
                name: "motion velocities".to_string(),
                required: self.motion_datas.len(),
                available: self.motion_velocities.len(),
            });
        }
        if self.motion_datas.len() > self.bodies.len() {
            return Err(PhysicsError::BufferTooSmall {
                name: "bodies".to_string(),
                required: self.motion_datas.len(),
                available: self.bodies.len(),
            });
        }
        Ok(())
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Insert a dynamic body; static body indices shift up by one
    pub fn add_dynamic_body(
        &mut self,
        body: RigidBody,
        mut motion: MotionData,
        velocity: MotionVelocity,
    ) -> usize {
        let index = self.num_dynamic_bodies();
        motion.position = body.position;
        motion.rotation = body.rotation;

        self.bodies.insert(index, body);
        self.motion_datas.push(motion);
        self.motion_velocities.push(velocity);

        for joint in &mut self.joints {
            for slot in [&mut joint.body_pair.body_index_a, &mut joint.body_pair.body_index_b] {
                if *slot >= index as i32 {
                    *slot += 1;
                }
            }
        }
        index
    }

    pub fn add_static_body(&mut self, body: RigidBody) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn add_joint(&mut self, joint: Joint) -> usize {
        self.joints.push(joint);
        self.joints.len() - 1
    }

    /// Dynamic bodies followed by static bodies
    pub fn dynamic_bodies(&self) -> &[RigidBody] {
        let count = self.num_dynamic_bodies().min(self.bodies.len());
        &self.bodies[..count]
    }

    pub fn static_bodies(&self) -> &[RigidBody] {
        self.bodies.get(self.num_dynamic_bodies()..).unwrap_or(&[])
    }

    /// Entity owning body `index`
    pub fn entity(&self, index: i32) -> PhysicsResult<Entity> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.bodies.get(i))
            .map(|body| body.entity)
            .ok_or(PhysicsError::BodyIndexOutOfRange {
                index: index as i64,
                count: self.bodies.len(),
            })
    }

    /// Copy motion transforms back onto the dynamic bodies
    pub fn sync_bodies_from_motions(&mut self) {
        for (body, motion) in self.bodies.iter_mut().zip(&self.motion_datas) {
            body.position = motion.position;
            body.rotation = motion.rotation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_body_counts() {
        let world = PhysicsWorld::with_body_counts(1, 1, 0);
        assert_eq!(world.num_static_bodies(), 1);
        assert_eq!(world.num_dynamic_bodies(), 1);
        assert_eq!(world.num_bodies(), 2);
        assert_eq!(world.num_joints(), 0);
    }

    #[test]
    fn test_dynamic_bodies_stay_first() {
        let mut world = PhysicsWorld::new();
        let ground = world.add_static_body(RigidBody::sphere(Entity::new(0, 1), Vec3::ZERO, 10.0));
        assert_eq!(ground, 0);
        world.add_joint(Joint::distance(0, 0, 1.0));

        let ball = world.add_dynamic_body(
            RigidBody::sphere(Entity::new(1, 1), Vec3::new(0.0, 12.0, 0.0), 1.0),
            MotionData::default(),
            MotionVelocity::default(),
        );

        assert_eq!(ball, 0);
        assert_eq!(world.bodies[0].entity, Entity::new(1, 1));
        assert_eq!(world.bodies[1].entity, Entity::new(0, 1));
        assert_eq!(world.joints[0].body_pair.body_index_a, 1);
        assert_eq!(world.motion_datas[0].position, [0.0, 12.0, 0.0]);
    }

    #[test]
    fn test_mismatched_motion_arrays() {
        let mut world = PhysicsWorld::with_body_counts(0, 1, 0);
        assert!(world.validate().is_ok());

        world.motion_datas.push(MotionData::default());
        world.motion_velocities.push(MotionVelocity::default());
        assert!(matches!(
            world.validate(),
            Err(PhysicsError::BufferTooSmall { required: 2, available: 1, .. })
        ));
        assert_eq!(world.num_static_bodies(), 0);
        assert_eq!(world.dynamic_bodies().len(), 1);
        assert!(world.static_bodies().is_empty());
        world.sync_bodies_from_motions();

        world.motion_velocities.pop();
        assert!(world.validate().is_err());
    }
}
