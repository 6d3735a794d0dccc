//! Sequential-impulse solver
//!
//! Solves the Jacobian grids in place, so impulses accumulated in the
//! records are what the events and the warm-start cache report. After
//! the iterations it writes velocities back, integrates awake bodies and
//! updates sleeping.

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use super::{DebugContact, ReferenceWorld, SolverBody};
use crate::constants::solver::{
    PENETRATION_RECOVERY, SLEEP_ANGULAR_THRESHOLD, SLEEP_FRAMES, SLEEP_LINEAR_THRESHOLD,
};
use crate::error::PhysicsResult;
use crate::pipeline::step_context::cache_entry;
use crate::pipeline::{BodyIdTable, StepContext};
use crate::records::{
    write_collision_event, BodyIndexPair, CollisionCache, CollisionEventHeader, FrictionRow, JacobianFlags,
    JacobianHeader, JacobianHeaderFlags, JacobianRecordMut, ManifoldType, MassFactors,
    QualityFlags, TriggerEventRecord,
};
use crate::stream::{LinkedRange, StreamArena, StreamId};

const STREAM: &str = "jacobians";

/// Twist friction limit relative to the tangential one
const TWIST_FRICTION_SCALE: f32 = 0.1;

/// What one solve produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SolveSummary {
    pub jacobians: usize,
    pub collision_events: usize,
    pub trigger_events: usize,
}

/// Mass properties of one side of a contact
#[derive(Debug, Clone, Copy)]
struct Masses {
    inverse_mass: f32,
    inverse_inertia: Vec3,
}

/// Bodies of one record in solver-local indices, with their scaled masses
#[derive(Debug, Clone, Copy)]
struct RecordBodies {
    a: usize,
    b: usize,
    masses_a: Masses,
    masses_b: Masses,
}

impl RecordBodies {
    fn new(
        bodies: &[SolverBody],
        ids: &BodyIdTable,
        pair: BodyIndexPair,
        factors: Option<MassFactors>,
    ) -> PhysicsResult<Self> {
        let a = ids.local(pair.body_index_a as u32)? as usize;
        let b = ids.local(pair.body_index_b as u32)? as usize;
        let factors = factors.unwrap_or(MassFactors::IDENTITY);
        let masses = |index: usize, mass_factor: f32, inertia_factor: [f32; 3]| {
            let body = bodies.get(index).copied().unwrap_or_default();
            Masses {
                inverse_mass: body.inverse_mass * mass_factor,
                inverse_inertia: body.inverse_inertia * Vec3::from_array(inertia_factor),
            }
        };
        Ok(Self {
            a,
            b,
            masses_a: masses(a, factors.inverse_mass_factor_a, factors.inverse_inertia_factor_a),
            masses_b: masses(b, factors.inverse_mass_factor_b, factors.inverse_inertia_factor_b),
        })
    }

    fn relative_velocity(&self, bodies: &[SolverBody], linear: Vec3, angular_a: Vec3, angular_b: Vec3) -> f32 {
        let (a, b) = (&bodies[self.a], &bodies[self.b]);
        linear.dot(b.linear - a.linear) + b.angular.dot(angular_b) - a.angular.dot(angular_a)
    }

    fn apply(&self, bodies: &mut [SolverBody], linear: Vec3, angular_a: Vec3, angular_b: Vec3, impulse: f32) {
        let a = &mut bodies[self.a];
        a.linear -= linear * (impulse * self.masses_a.inverse_mass);
        a.angular -= self.masses_a.inverse_inertia * angular_a * impulse;
        let b = &mut bodies[self.b];
        b.linear += linear * (impulse * self.masses_b.inverse_mass);
        b.angular += self.masses_b.inverse_inertia * angular_b * impulse;
    }

    /// One clamped friction iteration; `rhs` is the target relative velocity
    fn solve_friction(&self, bodies: &mut [SolverBody], row: &mut FrictionRow, limit: f32) {
        let (linear, angular_a, angular_b) = (
            Vec3::from_array(row.linear),
            Vec3::from_array(row.angular_a),
            Vec3::from_array(row.angular_b),
        );
        let relative = self.relative_velocity(bodies, linear, angular_a, angular_b);
        let accumulated = (row.impulse + row.effective_mass * (row.rhs - relative)).clamp(-limit, limit);
        let applied = accumulated - row.impulse;
        row.impulse = accumulated;
        self.apply(bodies, linear, angular_a, angular_b, applied);
    }
}

/// Visit every record of a grid in place
fn for_each_jacobian<F>(streams: &mut StreamArena, grid: &[LinkedRange], mut visit: F) -> PhysicsResult<()>
where
    F: FnMut(&mut JacobianRecordMut<'_>) -> PhysicsResult<()>,
{
    for segment in grid.iter().flat_map(LinkedRange::segments) {
        let mut cursor = streams.cursor_mut(segment)?;
        while cursor.has_items() {
            let size = {
                let mut record = JacobianRecordMut::parse(cursor.peek_mut()?)?;
                visit(&mut record)?;
                record.layout().total_size
            };
            cursor.advance(size)?;
        }
    }
    Ok(())
}

fn record_bodies(
    record: &JacobianRecordMut<'_>,
    bodies: &[SolverBody],
    ids: &BodyIdTable,
) -> PhysicsResult<(JacobianHeader, RecordBodies)> {
    let view = record.as_record();
    let header = *view.header()?;
    let factors = view.mass_factors()?.copied();
    let pair = RecordBodies::new(bodies, ids, header.body_pair, factors)?;
    Ok((header, pair))
}

fn is_solvable(header: &JacobianHeader) -> bool {
    !header
        .header_flags()
        .contains(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL)
}

/// Apply last step's impulse, spread evenly over the contact points
fn warm_start(
    record: &mut JacobianRecordMut<'_>,
    bodies: &mut [SolverBody],
    ids: &BodyIdTable,
    caches: &mut [CollisionCache],
) -> PhysicsResult<()> {
    let (header, pair) = record_bodies(record, bodies, ids)?;
    if !is_solvable(&header) {
        return Ok(());
    }
    let cache = cache_entry(caches, header.cache_index, STREAM)?;
    if !cache.quality_flags().contains(QualityFlags::ENABLE_CONTACT_CACHING) || cache.cached_impulse <= 0.0 {
        return Ok(());
    }

    let normal = header.normal();
    let angular = record.angular_mut()?;
    let share = cache.cached_impulse / angular.len().max(1) as f32;
    for jacobian in angular.iter_mut() {
        jacobian.impulse = share;
        pair.apply(
            bodies,
            normal,
            Vec3::from_array(jacobian.angular_a),
            Vec3::from_array(jacobian.angular_b),
            share,
        );
    }
    Ok(())
}

fn solve_record(
    record: &mut JacobianRecordMut<'_>,
    bodies: &mut [SolverBody],
    ids: &BodyIdTable,
) -> PhysicsResult<()> {
    let (header, pair) = record_bodies(record, bodies, ids)?;
    if !is_solvable(&header) {
        return Ok(());
    }

    let normal = header.normal();
    let mut total = 0.0;
    for jacobian in record.angular_mut()?.iter_mut() {
        let (angular_a, angular_b) = (
            Vec3::from_array(jacobian.angular_a),
            Vec3::from_array(jacobian.angular_b),
        );
        let relative = pair.relative_velocity(bodies, normal, angular_a, angular_b);
        let delta = jacobian.effective_mass * (jacobian.velocity_to_reach_contact_plane - relative);
        let accumulated = (jacobian.impulse + delta).max(0.0);
        let applied = accumulated - jacobian.impulse;
        jacobian.impulse = accumulated;
        pair.apply(bodies, normal, angular_a, angular_b, applied);
        total += accumulated;
    }

    let limit = header.coefficient_of_friction * total;
    if let Some(friction) = record.friction_mut()? {
        pair.solve_friction(bodies, &mut friction.friction0, limit);
        pair.solve_friction(bodies, &mut friction.friction1, limit);
        pair.solve_friction(bodies, &mut friction.angular_friction, limit * TWIST_FRICTION_SCALE);
    }
    Ok(())
}

/// Distance joints between engine bodies, solved as bilateral constraints
fn solve_joints(world: &ReferenceWorld, bodies: &mut [SolverBody]) {
    let time_step = world.parameters.time_step.max(f32::EPSILON);
    for joint in &world.joints {
        let (Ok(a), Ok(b)) = (
            usize::try_from(joint.body_pair.body_index_a),
            usize::try_from(joint.body_pair.body_index_b),
        ) else {
            continue;
        };
        if a >= bodies.len() || b >= bodies.len() || a == b {
            continue;
        }
        let delta = bodies[b].position - bodies[a].position;
        let length = delta.length();
        if length <= f32::EPSILON {
            continue;
        }
        let direction = delta / length;
        let inverse_mass = bodies[a].inverse_mass + bodies[b].inverse_mass;
        if inverse_mass <= 0.0 {
            continue;
        }
        let error = length - joint.rest_length;
        let relative = direction.dot(bodies[b].linear - bodies[a].linear);
        let impulse = -(relative + PENETRATION_RECOVERY * error / time_step) / inverse_mass;
        let (mass_a, mass_b) = (bodies[a].inverse_mass, bodies[b].inverse_mass);
        bodies[a].linear -= direction * (impulse * mass_a);
        bodies[b].linear += direction * (impulse * mass_b);
    }
}

/// Collision and trigger events found in one grid
#[derive(Debug, Default)]
struct GridEvents {
    collisions: Vec<(CollisionEventHeader, usize)>,
    triggers: Vec<TriggerEventRecord>,
}

/// Post-solve pass over one grid: update caches, warm-start data, events
/// and debug contacts
fn finalize_grid(
    world: &mut ReferenceWorld,
    streams: &mut StreamArena,
    grid: &[LinkedRange],
    caches: &mut [CollisionCache],
    next_warm_start: &mut FxHashMap<(u32, u32), f32>,
) -> PhysicsResult<GridEvents> {
    let mut events = GridEvents::default();
    let ReferenceWorld {
        prepared,
        debug_contacts,
        ..
    } = world;

    for_each_jacobian(streams, grid, |record| {
        let view = record.as_record();
        let header = *view.header()?;
        let total: f32 = view.angular()?.iter().map(|j| j.impulse).sum();
        let cache = cache_entry(caches, header.cache_index, STREAM)?;
        let manifold = prepared
            .get(header.cache_index as usize)
            .copied()
            .unwrap_or_default();
        let flags = header.jacobian_flags();

        if is_solvable(&header) {
            cache.cached_impulse = total;
            if cache.quality_flags().contains(QualityFlags::ENABLE_CONTACT_CACHING) && total > 0.0 {
                let key = (header.body_pair.body_index_a as u32, header.body_pair.body_index_b as u32);
                next_warm_start.insert(key, total);
            }
            if flags.contains(JacobianFlags::ENABLE_COLLISION_EVENTS)
                && (total > 0.0 || manifold.min_distance() <= 0.0)
            {
                let mut event = CollisionEventHeader::new(header.body_pair, header.normal(), total);
                event.collider_key_a = manifold.collider_keys.0;
                event.collider_key_b = manifold.collider_keys.1;
                events.collisions.push((event, header.cache_index as usize));
            }
            for (point, jacobian) in manifold.points().iter().zip(view.angular()?) {
                debug_contacts.push(DebugContact {
                    position: point.position,
                    normal: header.normal,
                    impulse: jacobian.impulse,
                });
            }
        } else {
            cache.cached_impulse = 0.0;
            if header.manifold_type() == Some(ManifoldType::Trigger)
                && flags.contains(JacobianFlags::IS_TRIGGER)
                && manifold.min_distance() <= 0.0
            {
                events.triggers.push(TriggerEventRecord {
                    body_pair: header.body_pair,
                    collider_key_a: manifold.collider_keys.0,
                    collider_key_b: manifold.collider_keys.1,
                });
            }
        }
        Ok(())
    })?;
    Ok(events)
}

fn write_collision_events(
    world: &ReferenceWorld,
    streams: &mut StreamArena,
    id: StreamId,
    events: &[(CollisionEventHeader, usize)],
) -> PhysicsResult<LinkedRange> {
    let stream = streams.get_mut(id)?;
    let mark = stream.mark();
    for (header, cache_index) in events {
        let points = world
            .prepared
            .get(*cache_index)
            .map(|manifold| manifold.points())
            .unwrap_or(&[]);
        write_collision_event(stream, header, points)?;
    }
    Ok(stream.range_since(id, &mark))
}

fn write_trigger_events(
    streams: &mut StreamArena,
    id: StreamId,
    events: &[TriggerEventRecord],
) -> PhysicsResult<LinkedRange> {
    let stream = streams.get_mut(id)?;
    let mark = stream.mark();
    for event in events {
        stream.append(event);
    }
    Ok(stream.range_since(id, &mark))
}

/// Damping, then explicit integration of position and orientation
fn integrate(world: &mut ReferenceWorld) {
    let time_step = world.parameters.time_step;
    for index in 0..world.num_dynamic() {
        if world.is_asleep(index) {
            continue;
        }
        let motion = &mut world.motion_datas[index];
        let velocity = &mut world.motion_velocities[index];

        let linear = Vec3::from_array(velocity.linear) / (1.0 + time_step * motion.linear_damping);
        let angular = Vec3::from_array(velocity.angular) / (1.0 + time_step * motion.angular_damping);
        velocity.linear = linear.to_array();
        velocity.angular = angular.to_array();

        let position = Vec3::from_array(motion.position) + linear * time_step;
        motion.position = position.to_array();

        let rotation = Quat::from_array(motion.rotation);
        let spin = Quat::from_xyzw(angular.x, angular.y, angular.z, 0.0) * rotation;
        let rotation = Quat::from_xyzw(
            rotation.x + 0.5 * time_step * spin.x,
            rotation.y + 0.5 * time_step * spin.y,
            rotation.z + 0.5 * time_step * spin.z,
            rotation.w + 0.5 * time_step * spin.w,
        )
        .normalize();
        motion.rotation = rotation.to_array();
    }
}

fn update_sleeping(world: &mut ReferenceWorld) {
    if !world.config.enable_sleeping {
        for index in 0..world.num_dynamic() {
            world.wake(index);
        }
        return;
    }

    for index in 0..world.num_dynamic() {
        let velocity = world.motion_velocities[index];
        if world.is_asleep(index) || velocity.inverse_mass <= 0.0 {
            continue;
        }
        let resting = Vec3::from_array(velocity.linear).length() < SLEEP_LINEAR_THRESHOLD
            && Vec3::from_array(velocity.angular).length() < SLEEP_ANGULAR_THRESHOLD;
        let frames = &mut world.resting_frames[index];
        *frames = if resting { *frames + 1 } else { 0 };
        if *frames >= SLEEP_FRAMES {
            world.asleep.set(index, true);
            let velocity = &mut world.motion_velocities[index];
            velocity.linear = [0.0; 3];
            velocity.angular = [0.0; 3];
            log::trace!("[ReferenceBackend::solve] Body {} fell asleep", index);
        }
    }
}

/// Run the solver over both grids and emit this step's events
pub(crate) fn solve(world: &mut ReferenceWorld, context: &mut StepContext) -> PhysicsResult<SolveSummary> {
    let StepContext {
        streams,
        ids,
        body_index_to_local,
        collision_caches,
        fixed_jacobian_grid,
        moving_jacobian_grid,
        collision_events,
        trigger_events,
        ..
    } = context;

    // Jointed bodies wake together
    for joint in world.joints.clone() {
        let (a, b) = (joint.body_pair.body_index_a as usize, joint.body_pair.body_index_b as usize);
        if world.is_awake(a) && world.is_dynamic(b) {
            world.wake(b);
        } else if world.is_awake(b) && world.is_dynamic(a) {
            world.wake(a);
        }
    }

    let mut bodies: Vec<SolverBody> = (0..world.num_bodies()).map(|i| world.solver_body(i)).collect();
    let grids = [&*fixed_jacobian_grid, &*moving_jacobian_grid];

    let mut jacobians = 0;
    for grid in grids {
        for_each_jacobian(streams, grid, |record| {
            jacobians += 1;
            warm_start(record, &mut bodies, body_index_to_local, collision_caches)
        })?;
    }

    let iterations = world.parameters.solver_iterations.max(1);
    for _ in 0..iterations {
        solve_joints(world, &mut bodies);
        for grid in grids {
            for_each_jacobian(streams, grid, |record| {
                solve_record(record, &mut bodies, body_index_to_local)
            })?;
        }
    }

    world.debug_contacts.clear();
    let mut next_warm_start = FxHashMap::default();
    let fixed = finalize_grid(world, streams, fixed_jacobian_grid, collision_caches, &mut next_warm_start)?;
    let moving = finalize_grid(world, streams, moving_jacobian_grid, collision_caches, &mut next_warm_start)?;
    world.warm_start = next_warm_start;

    let mut collisions = write_collision_events(world, streams, ids.fixed_collision_events, &fixed.collisions)?;
    collisions.chain(write_collision_events(
        world,
        streams,
        ids.moving_collision_events,
        &moving.collisions,
    )?);
    let mut triggers = write_trigger_events(streams, ids.fixed_trigger_events, &fixed.triggers)?;
    triggers.chain(write_trigger_events(streams, ids.moving_trigger_events, &moving.triggers)?);

    let summary = SolveSummary {
        jacobians,
        collision_events: collisions.total_elements(),
        trigger_events: triggers.total_elements(),
    };
    *collision_events = Some(collisions);
    *trigger_events = Some(triggers);

    for (index, body) in bodies.iter().enumerate().take(world.num_dynamic()) {
        if world.is_asleep(index) {
            continue;
        }
        let velocity = &mut world.motion_velocities[index];
        velocity.linear = body.linear.to_array();
        velocity.angular = body.angular.to_array();
    }
    integrate(world);
    update_sleeping(world);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendPhase, ReferenceBackend, StepParameters, SteppingBackend, SyncInput, WorldHandle,
    };
    use crate::body::{
        CollisionResponse, Entity, Joint, MotionData, MotionVelocity, PhysicsWorld, RigidBody,
        StridedSlice,
    };
    use crate::config::PhysicsConfiguration;
    use crate::events::{CollisionEvents, TriggerEvents};

    const TIME_STEP: f32 = 1.0 / 60.0;

    fn step(
        backend: &mut ReferenceBackend,
        handle: WorldHandle,
        world: &mut PhysicsWorld,
        context: &mut StepContext,
        gravity: Vec3,
    ) -> PhysicsResult<()> {
        context.begin_step();
        let input = SyncInput {
            bodies: StridedSlice::from_slice(&world.bodies),
            motion_datas: StridedSlice::from_slice(&world.motion_datas),
            motion_velocities: StridedSlice::from_slice(&world.motion_velocities),
            joints: StridedSlice::from_slice(&world.joints),
            num_dynamic_bodies: world.num_dynamic_bodies(),
            synchronize_static_bodies: true,
        };
        backend.sync_world_in(handle, &input, context)?;
        backend.step_world(
            handle,
            &StepParameters {
                time_step: TIME_STEP,
                gravity,
                solver_iterations: 8,
                thread_count: 1,
            },
        )?;
        for phase in [
            BackendPhase::Broadphase,
            BackendPhase::Narrowphase,
            BackendPhase::SolverPrep,
            BackendPhase::SolverSolve,
        ] {
            backend.process_phase(handle, phase, context)?;
        }
        let count = world.num_dynamic_bodies();
        backend.sync_motions_out(
            handle,
            0,
            &mut world.motion_datas[..count],
            &mut world.motion_velocities[..count],
        )?;
        world.sync_bodies_from_motions();
        Ok(())
    }

    /// A unit sphere resting on a static unit sphere
    fn stacked(response: CollisionResponse) -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        world.add_static_body(RigidBody::sphere(Entity::new(1, 1), Vec3::ZERO, 0.5));
        world.add_dynamic_body(
            RigidBody::sphere(Entity::new(2, 1), Vec3::new(0.0, 1.0, 0.0), 0.5).with_response(response),
            MotionData::default(),
            MotionVelocity::sphere(1.0, 0.5),
        );
        world
    }

    fn setup(config: PhysicsConfiguration) -> (ReferenceBackend, WorldHandle, StepContext) {
        let mut backend = ReferenceBackend::new();
        let handle = backend.allocate_world(&config).expect("world");
        (backend, handle, StepContext::new())
    }

    #[test]
    fn test_resting_contact_holds_body() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = stacked(CollisionResponse::Collide);
        for _ in 0..60 {
            step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");
        }
        let height = world.motion_datas[0].position[1];
        assert!((height - 1.0).abs() < 0.05, "body sank to {}", height);
        assert!(world.motion_velocities[0].linear[1].abs() < 0.5);
    }

    #[test]
    fn test_falling_body_without_contact() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = PhysicsWorld::new();
        world.add_dynamic_body(
            RigidBody::sphere(Entity::new(0, 1), Vec3::new(0.0, 10.0, 0.0), 0.5),
            MotionData::default(),
            MotionVelocity::sphere(1.0, 0.5),
        );
        step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -10.0, 0.0)).expect("step");
        assert!(world.motion_velocities[0].linear[1] < 0.0);
        assert!(world.motion_datas[0].position[1] < 10.0);
        assert!(context.collision_events.as_ref().expect("events").is_empty());
    }

    #[test]
    fn test_collision_events_report_impulse() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = stacked(CollisionResponse::RaiseCollisionEvents);
        step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");

        let events = CollisionEvents::new(&context, &world, &[], TIME_STEP);
        let collected: Vec<_> = events.iter().collect::<PhysicsResult<_>>().expect("events");
        assert_eq!(collected.len(), 1);
        let event = &collected[0];
        assert_eq!(event.body_index_a, 0);
        assert_eq!(event.body_index_b, 1);
        assert!(event.impulse > 0.0);
        // Dynamic body is A, so the normal points down into the static one
        assert!(event.normal.y < -0.99);
        assert_eq!(event.contact_points().len(), 1);
    }

    #[test]
    fn test_trigger_applies_no_impulse() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = PhysicsWorld::new();
        world.add_static_body(
            RigidBody::sphere(Entity::new(1, 1), Vec3::ZERO, 1.0).with_response(CollisionResponse::RaiseTriggerEvents),
        );
        world.add_dynamic_body(
            RigidBody::sphere(Entity::new(2, 1), Vec3::new(0.0, 0.5, 0.0), 0.5),
            MotionData::default(),
            MotionVelocity::sphere(1.0, 0.5),
        );
        step(&mut backend, handle, &mut world, &mut context, Vec3::ZERO).expect("step");

        let triggers: Vec<_> = TriggerEvents::new(&context, &world)
            .iter()
            .collect::<PhysicsResult<_>>()
            .expect("triggers");
        assert_eq!(triggers.len(), 1);
        assert_eq!(world.motion_velocities[0].linear, [0.0; 3]);
        assert!(CollisionEvents::new(&context, &world, &[], TIME_STEP).is_empty());
    }

    #[test]
    fn test_impulse_is_carried_to_next_step() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = stacked(CollisionResponse::Collide);
        step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");

        let state = backend.world(handle).expect("world");
        let key = (ReferenceWorld::body_id(0), ReferenceWorld::body_id(1));
        let impulse = state.warm_start.get(&key).copied().expect("cached impulse");
        assert!(impulse > 0.0);

        step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");
        assert!(context.collision_caches[0].cached_impulse > 0.0);
    }

    #[test]
    fn test_resting_body_falls_asleep() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = stacked(CollisionResponse::Collide);
        for _ in 0..(SLEEP_FRAMES as usize * 4) {
            step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");
        }
        assert!(backend.is_body_asleep(handle, 0).expect("world"));

        let mut config = PhysicsConfiguration::default();
        config.enable_sleeping = false;
        let (mut backend, handle, mut context) = setup(config);
        let mut world = stacked(CollisionResponse::Collide);
        for _ in 0..(SLEEP_FRAMES as usize * 4) {
            step(&mut backend, handle, &mut world, &mut context, Vec3::new(0.0, -9.81, 0.0)).expect("step");
        }
        assert!(!backend.is_body_asleep(handle, 0).expect("world"));
    }

    #[test]
    fn test_distance_joint_pulls_bodies_together() {
        let (mut backend, handle, mut context) = setup(PhysicsConfiguration::default());
        let mut world = PhysicsWorld::new();
        for x in [0.0, 4.0] {
            world.add_dynamic_body(
                RigidBody::sphere(Entity::new(x as i32, 1), Vec3::new(x, 0.0, 0.0), 0.25),
                MotionData::default(),
                MotionVelocity::sphere(1.0, 0.25),
            );
        }
        world.add_joint(Joint::distance(0, 1, 2.0));
        for _ in 0..120 {
            step(&mut backend, handle, &mut world, &mut context, Vec3::ZERO).expect("step");
        }
        let a = Vec3::from_array(world.motion_datas[0].position);
        let b = Vec3::from_array(world.motion_datas[1].position);
        assert!((a.distance(b) - 2.0).abs() < 0.2, "distance {}", a.distance(b));
    }
}
