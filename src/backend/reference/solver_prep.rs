//! Solver preparation - Jacobian records from the final manifolds
//!
//! Runs after contact modification, so it reads manifold headers and cache
//! entries as the callbacks left them. A record goes into the fixed grid
//! when either body is static and into the moving grid otherwise; each grid
//! entry holds at most `JACOBIANS_PER_GRID_ENTRY` records.

use glam::Vec3;

use super::{PreparedManifold, ReferenceWorld, SolverBody};
use crate::constants::contact::{JACOBIANS_PER_GRID_ENTRY, MAX_CONTACT_POINTS};
use crate::constants::solver::PENETRATION_RECOVERY;
use crate::error::PhysicsResult;
use crate::pipeline::step_context::cache_entry;
use crate::pipeline::StepContext;
use crate::records::{
    friction_basis, write_jacobian, BodyIndexPair, CollisionCache, CollisionFlags, FrictionRow,
    Jac3dFriction, JacAngular, JacobianFlags, JacobianHeader, JacobianHeaderFlags, JacobianSections,
    ManifoldHeader, ManifoldStreamHeader, ManifoldType, ManifoldView, MassFactors,
    SurfaceVelocitySection,
};
use crate::stream::{BlockStream, LinkedRange, StreamArena, StreamId, StreamMark};

const STREAM: &str = "manifolds";

/// Splits the records written to one stream into grid entries
#[derive(Debug)]
struct GridBuilder {
    id: StreamId,
    mark: Option<StreamMark>,
    count: usize,
    entries: Vec<LinkedRange>,
}

impl GridBuilder {
    fn new(id: StreamId) -> Self {
        Self {
            id,
            mark: None,
            count: 0,
            entries: Vec::new(),
        }
    }

    fn write(
        &mut self,
        streams: &mut StreamArena,
        header: &JacobianHeader,
        sections: &JacobianSections<'_>,
    ) -> PhysicsResult<()> {
        let stream = streams.get_mut(self.id)?;
        if self.mark.is_none() {
            self.mark = Some(stream.mark());
        }
        write_jacobian(stream, header, sections)?;
        self.count += 1;
        if self.count == JACOBIANS_PER_GRID_ENTRY {
            self.close(stream);
        }
        Ok(())
    }

    fn close(&mut self, stream: &BlockStream) {
        if let Some(mark) = self.mark.take() {
            self.entries.push(stream.range_since(self.id, &mark));
        }
        self.count = 0;
    }

    fn finish(mut self, streams: &StreamArena) -> PhysicsResult<Vec<LinkedRange>> {
        let stream = streams.get(self.id)?;
        self.close(stream);
        Ok(self.entries)
    }
}

/// Scale a body's mass properties by one side of the mass factors
fn scaled(body: SolverBody, inverse_mass_factor: f32, inverse_inertia_factor: [f32; 3]) -> SolverBody {
    SolverBody {
        inverse_mass: body.inverse_mass * inverse_mass_factor,
        inverse_inertia: body.inverse_inertia * Vec3::from_array(inverse_inertia_factor),
        ..body
    }
}

fn friction_row(a: &SolverBody, b: &SolverBody, linear: Vec3, arm_a: Vec3, arm_b: Vec3) -> FrictionRow {
    let angular_a = arm_a.cross(linear);
    let angular_b = arm_b.cross(linear);
    let k = a.inverse_mass
        + b.inverse_mass
        + angular_a.dot(a.inverse_inertia * angular_a)
        + angular_b.dot(b.inverse_inertia * angular_b);
    FrictionRow {
        linear: linear.to_array(),
        rhs: 0.0,
        angular_a: angular_a.to_array(),
        effective_mass: if k > 0.0 { 1.0 / k } else { 0.0 },
        angular_b: angular_b.to_array(),
        impulse: 0.0,
    }
}

fn twist_row(a: &SolverBody, b: &SolverBody, normal: Vec3) -> FrictionRow {
    let k = normal.dot(a.inverse_inertia * normal) + normal.dot(b.inverse_inertia * normal);
    FrictionRow {
        linear: [0.0; 3],
        rhs: 0.0,
        angular_a: normal.to_array(),
        effective_mass: if k > 0.0 { 1.0 / k } else { 0.0 },
        angular_b: normal.to_array(),
        impulse: 0.0,
    }
}

/// Everything needed to write one Jacobian record
struct JacobianInput<'m> {
    pair: BodyIndexPair,
    manifold: &'m ManifoldHeader,
    points: &'m PreparedManifold,
    bodies: (SolverBody, SolverBody),
}

fn write_record(
    world: &ReferenceWorld,
    input: &JacobianInput<'_>,
    cache: &CollisionCache,
    grid: &mut GridBuilder,
    streams: &mut StreamArena,
) -> PhysicsResult<()> {
    let time_step = world.parameters.time_step.max(f32::EPSILON);
    let normal = input.manifold.normal();
    let jacobian_flags = cache.jacobian_flags();
    let collision_flags = cache.collision_flags();

    let manifold_type = if jacobian_flags.contains(JacobianFlags::DISABLED) {
        ManifoldType::Disabled
    } else {
        input.manifold.manifold_type().unwrap_or(ManifoldType::Normal)
    };
    let not_normal = manifold_type != ManifoldType::Normal
        || jacobian_flags.contains(JacobianFlags::IS_TRIGGER)
        || collision_flags.contains(CollisionFlags::DONT_BUILD_CONTACT_JACOBIANS);

    let mass_factors = jacobian_flags
        .contains(JacobianFlags::ENABLE_MASS_FACTORS)
        .then_some(input.manifold.mass_factors);
    let factors = mass_factors.unwrap_or(MassFactors::IDENTITY);
    let body_a = scaled(input.bodies.0, factors.inverse_mass_factor_a, factors.inverse_inertia_factor_a);
    let body_b = scaled(input.bodies.1, factors.inverse_mass_factor_b, factors.inverse_inertia_factor_b);

    let restitution_threshold = world.config.solver.contact_restitution_threshold;
    let mut angular = [JacAngular::default(); MAX_CONTACT_POINTS];
    for (jacobian, point) in angular.iter_mut().zip(input.points.points()) {
        let position = point.position();
        let angular_a = (position - body_a.position).cross(normal);
        let angular_b = (position - body_b.position).cross(normal);
        let k = body_a.inverse_mass
            + body_b.inverse_mass
            + angular_a.dot(body_a.inverse_inertia * angular_a)
            + angular_b.dot(body_b.inverse_inertia * angular_b);

        let relative = normal.dot(body_b.linear - body_a.linear) + body_b.angular.dot(angular_b)
            - body_a.angular.dot(angular_a);
        // Separated contacts may close their gap; penetrating ones recover a share of it
        let mut target = if point.distance >= 0.0 {
            -point.distance / time_step
        } else {
            -PENETRATION_RECOVERY * point.distance / time_step
        };
        if collision_flags.contains(CollisionFlags::ENABLE_RESTITUTION)
            && -relative > restitution_threshold
        {
            target = target.max(-cache.restitution * relative);
        }

        *jacobian = JacAngular {
            angular_a: angular_a.to_array(),
            effective_mass: if k > 0.0 { 1.0 / k } else { 0.0 },
            angular_b: angular_b.to_array(),
            velocity_to_reach_contact_plane: target,
            impulse: 0.0,
            _padding: [0.0; 3],
        };
    }

    let friction = (!not_normal).then(|| {
        let points = input.points.points();
        let center = points.iter().map(|p| p.position()).sum::<Vec3>() / points.len().max(1) as f32;
        let (arm_a, arm_b) = (center - body_a.position, center - body_b.position);
        let (dir0, dir1) = friction_basis(normal);
        Jac3dFriction {
            friction0: friction_row(&body_a, &body_b, dir0, arm_a, arm_b),
            friction1: friction_row(&body_a, &body_b, dir1, arm_a, arm_b),
            angular_friction: twist_row(&body_a, &body_b, normal),
        }
    });

    let surface_velocity_enabled = collision_flags.contains(CollisionFlags::ENABLE_SURFACE_VELOCITY)
        || jacobian_flags.contains(JacobianFlags::ENABLE_SURFACE_VELOCITY);
    let surface_velocity = (surface_velocity_enabled && friction.is_some())
        .then(SurfaceVelocitySection::default);

    let mut header_flags = JacobianHeaderFlags::empty();
    header_flags.set(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL, not_normal);
    header_flags.set(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY, surface_velocity.is_some());

    let mut header = JacobianHeader::new(input.pair, input.manifold.cache_index, normal);
    header.manifold_type = manifold_type as u32 as u8;
    header.jacobian_flags = jacobian_flags.bits();
    header.set_header_flags(header_flags);
    header.coefficient_of_friction = cache.friction;
    header.coefficient_of_restitution = cache.restitution;

    let sections = JacobianSections {
        angular: &angular[..input.points.num_points],
        friction,
        surface_velocity,
        normal_velocity: None,
        mass_factors,
    };
    grid.write(streams, &header, &sections)
}

/// Build the fixed and moving Jacobian grids. Returns the number of records.
pub(crate) fn build_jacobians(world: &mut ReferenceWorld, context: &mut StepContext) -> PhysicsResult<usize> {
    let StepContext {
        streams,
        ids,
        manifolds,
        body_index_to_local,
        collision_caches,
        fixed_jacobian_grid,
        moving_jacobian_grid,
        ..
    } = context;

    let mut inputs = Vec::with_capacity(collision_caches.len());
    for segment in manifolds.segments() {
        let mut reader = streams.reader(segment)?;
        while reader.has_items() {
            let pair_header: ManifoldStreamHeader = reader.read_copy()?;
            for _ in 0..pair_header.num_manifolds {
                let view = ManifoldView::parse(reader.peek()?)?;
                let prepared = PreparedManifold::new(
                    view.points,
                    (view.header.collider_key_a, view.header.collider_key_b),
                );
                inputs.push((pair_header.body_pair, *view.header, prepared));
                reader.advance(view.record_size())?;
            }
        }
    }

    world.prepared.clear();
    world
        .prepared
        .resize(collision_caches.len(), PreparedManifold::default());

    let mut fixed = GridBuilder::new(ids.fixed_jacobians);
    let mut moving = GridBuilder::new(ids.moving_jacobians);
    for (pair, manifold, prepared) in &inputs {
        let a = body_index_to_local.local(pair.body_index_a as u32)? as usize;
        let b = body_index_to_local.local(pair.body_index_b as u32)? as usize;

        // A contact with an awake body wakes a sleeping one
        if world.is_awake(a) && world.is_dynamic(b) {
            world.wake(b);
        } else if world.is_awake(b) && world.is_dynamic(a) {
            world.wake(a);
        }

        let cache = *cache_entry(collision_caches, manifold.cache_index, STREAM)?;
        let input = JacobianInput {
            pair: *pair,
            manifold,
            points: prepared,
            bodies: (world.solver_body(a), world.solver_body(b)),
        };
        let grid = if world.is_dynamic(a) && world.is_dynamic(b) {
            &mut moving
        } else {
            &mut fixed
        };
        write_record(world, &input, &cache, grid, streams)?;

        if let Some(slot) = world.prepared.get_mut(manifold.cache_index as usize) {
            *slot = *prepared;
        }
    }

    *fixed_jacobian_grid = fixed.finish(streams)?;
    *moving_jacobian_grid = moving.finish(streams)?;
    Ok(inputs.len())
}
