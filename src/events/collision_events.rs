//! Collision events raised by the solver

use glam::Vec3;

use super::RangeCursor;
use crate::body::{Entity, PhysicsWorld, Velocity};
use crate::error::PhysicsResult;
use crate::pipeline::{BodyIdTable, StepContext};
use crate::records::{CollisionEventView, ContactPointRecord};
use crate::stream::{LinkedRange, StreamArena};

/// The collision events of one step
#[derive(Debug, Clone, Copy)]
pub struct CollisionEvents<'a> {
    streams: &'a StreamArena,
    ids: &'a BodyIdTable,
    range: Option<&'a LinkedRange>,
    world: &'a PhysicsWorld,
    input_velocities: &'a [Velocity],
    time_step: f32,
}

impl<'a> CollisionEvents<'a> {
    /// Events of the step held by `context`; empty once the context is invalidated
    pub fn new(
        context: &'a StepContext,
        world: &'a PhysicsWorld,
        input_velocities: &'a [Velocity],
        time_step: f32,
    ) -> Self {
        Self {
            streams: &context.streams,
            ids: &context.body_index_to_local,
            range: context.collision_events.as_ref(),
            world,
            input_velocities,
            time_step,
        }
    }

    pub fn iter(&self) -> CollisionEventsIter<'a> {
        CollisionEventsIter {
            events: *self,
            cursor: RangeCursor::new(self.streams, self.range),
        }
    }

    /// Number of events in the range
    pub fn len(&self) -> usize {
        self.range.map(LinkedRange::total_elements).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn input_velocity(&self, body_index: i32) -> Velocity {
        // Static bodies have no entry
        usize::try_from(body_index)
            .ok()
            .filter(|&index| index < self.world.num_dynamic_bodies())
            .and_then(|index| self.input_velocities.get(index).copied())
            .unwrap_or_default()
    }

    fn event(&self, bytes: &'a [u8]) -> PhysicsResult<CollisionEvent<'a>> {
        let view = CollisionEventView::parse(bytes)?;
        let header = view.header;
        let body_index_a = self.ids.local(header.body_pair.body_index_a as u32)?;
        let body_index_b = self.ids.local(header.body_pair.body_index_b as u32)?;
        Ok(CollisionEvent {
            body_index_a,
            body_index_b,
            entity_a: self.world.entity(body_index_a)?,
            entity_b: self.world.entity(body_index_b)?,
            collider_key_a: header.collider_key_a,
            collider_key_b: header.collider_key_b,
            normal: Vec3::from_array(header.normal),
            impulse: header.impulse,
            input_velocity_a: self.input_velocity(body_index_a),
            input_velocity_b: self.input_velocity(body_index_b),
            points: view.points,
            world: self.world,
            time_step: self.time_step,
        })
    }
}

impl<'a> IntoIterator for CollisionEvents<'a> {
    type Item = PhysicsResult<CollisionEvent<'a>>;
    type IntoIter = CollisionEventsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor over the collision events of one step
#[derive(Debug, Clone)]
pub struct CollisionEventsIter<'a> {
    events: CollisionEvents<'a>,
    cursor: RangeCursor<'a>,
}

impl<'a> Iterator for CollisionEventsIter<'a> {
    type Item = PhysicsResult<CollisionEvent<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self
            .cursor
            .next_record(|bytes| CollisionEventView::parse(bytes).map(|view| view.record_size()))?;
        Some(bytes.and_then(|bytes| self.events.event(bytes)))
    }
}

/// One collision between two bodies
#[derive(Debug, Clone, Copy)]
pub struct CollisionEvent<'a> {
    pub body_index_a: i32,
    pub body_index_b: i32,
    pub entity_a: Entity,
    pub entity_b: Entity,
    pub collider_key_a: u32,
    pub collider_key_b: u32,
    /// Points from A towards B
    pub normal: Vec3,
    /// Summed normal impulse the solver applied
    pub impulse: f32,
    /// Velocities before the step, gravity included; zero for static bodies
    pub input_velocity_a: Velocity,
    pub input_velocity_b: Velocity,
    points: &'a [ContactPointRecord],
    world: &'a PhysicsWorld,
    time_step: f32,
}

/// Derived quantities of a [`CollisionEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEventDetails {
    /// Solver impulse, or an estimate from the approach speed when the
    /// solver applied none
    pub estimated_impulse: f32,
    pub average_contact_point_position: Vec3,
    pub contact_point_positions: Vec<Vec3>,
    /// Velocity of B relative to A along the normal, negative when approaching
    pub relative_normal_velocity: f32,
}

impl<'a> CollisionEvent<'a> {
    pub fn contact_points(&self) -> &'a [ContactPointRecord] {
        self.points
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn calculate_details(&self) -> CollisionEventDetails {
        let contact_point_positions: Vec<Vec3> =
            self.points.iter().map(ContactPointRecord::position).collect();
        let average_contact_point_position = if contact_point_positions.is_empty() {
            Vec3::ZERO
        } else {
            contact_point_positions.iter().copied().sum::<Vec3>()
                / contact_point_positions.len() as f32
        };

        let point = average_contact_point_position;
        let velocity_a = self.point_velocity(self.body_index_a, &self.input_velocity_a, point);
        let velocity_b = self.point_velocity(self.body_index_b, &self.input_velocity_b, point);
        let relative_normal_velocity = (velocity_b - velocity_a).dot(self.normal);

        let inverse_mass = self.inverse_mass(self.body_index_a) + self.inverse_mass(self.body_index_b);
        let estimated_impulse = if self.impulse > 0.0 || inverse_mass <= 0.0 {
            self.impulse
        } else {
            (-relative_normal_velocity).max(0.0) / inverse_mass
        };

        CollisionEventDetails {
            estimated_impulse,
            average_contact_point_position,
            contact_point_positions,
            relative_normal_velocity,
        }
    }

    fn point_velocity(&self, body_index: i32, velocity: &Velocity, point: Vec3) -> Vec3 {
        let center = usize::try_from(body_index)
            .ok()
            .and_then(|index| self.world.bodies.get(index))
            .map(|body| Vec3::from_array(body.position))
            .unwrap_or(point);
        velocity.linear() + velocity.angular().cross(point - center)
    }

    fn inverse_mass(&self, body_index: i32) -> f32 {
        usize::try_from(body_index)
            .ok()
            .and_then(|index| self.world.motion_velocities.get(index))
            .map(|motion| motion.inverse_mass)
            .unwrap_or(0.0)
    }
}
