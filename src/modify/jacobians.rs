//! Jacobian modification, run after solver preparation
//!
//! Three independent change flags select disjoint write-back paths:
//! angular rows, modifier sections (mass factors, surface velocity) and
//! contact-level fields (normal, friction coefficient, friction rows).

use glam::Vec3;

use crate::body::{Entity, PhysicsWorld};
use crate::constants::contact::MAX_CONTACT_POINTS;
use crate::error::{PhysicsError, PhysicsResult};
use crate::pipeline::step_context::cache_entry;
use crate::pipeline::StepContext;
use crate::records::{
    friction_basis, CollisionCache, FrictionRow, Jac3dFriction, JacAngular, JacobianFlags,
    JacobianHeaderFlags, JacobianRecordMut, ManifoldType, MassFactors, QualityFlags,
};
use crate::stream::LinkedRange;

const STREAM: &str = "jacobians";

/// Velocity of a contact surface relative to its body
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceVelocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Header-level data of one contact Jacobian
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiableJacobianHeader {
    body_index_a: i32,
    body_index_b: i32,
    entity_a: Entity,
    entity_b: Entity,
    flags: JacobianFlags,

    angular: [JacAngular; MAX_CONTACT_POINTS],
    num_points: usize,
    mass_factors: Option<MassFactors>,
    surface_velocity: Option<SurfaceVelocity>,

    angular_changed: bool,
    modifiers_changed: bool,
}

impl ModifiableJacobianHeader {
    pub fn body_index_a(&self) -> i32 {
        self.body_index_a
    }

    pub fn body_index_b(&self) -> i32 {
        self.body_index_b
    }

    pub fn entity_a(&self) -> Entity {
        self.entity_a
    }

    pub fn entity_b(&self) -> Entity {
        self.entity_b
    }

    pub fn flags(&self) -> JacobianFlags {
        self.flags
    }

    /// Setting [`JacobianFlags::DISABLED`] here removes the Jacobian from the solve
    pub fn set_flags(&mut self, flags: JacobianFlags) {
        self.flags = flags;
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn angular_jacobians(&self) -> &[JacAngular] {
        &self.angular[..self.num_points]
    }

    pub fn angular_jacobians_mut(&mut self) -> &mut [JacAngular] {
        self.angular_changed = true;
        &mut self.angular[..self.num_points]
    }

    pub fn mass_factors(&self) -> PhysicsResult<MassFactors> {
        self.mass_factors
            .ok_or_else(|| PhysicsError::FeatureDisabled("mass factors".to_string()))
    }

    /// Fails unless the record was built with [`JacobianFlags::ENABLE_MASS_FACTORS`]
    pub fn set_mass_factors(&mut self, mass_factors: MassFactors) -> PhysicsResult<()> {
        let slot = self
            .mass_factors
            .as_mut()
            .ok_or_else(|| PhysicsError::FeatureDisabled("mass factors".to_string()))?;
        *slot = mass_factors;
        self.modifiers_changed = true;
        Ok(())
    }

    pub fn surface_velocity(&self) -> PhysicsResult<SurfaceVelocity> {
        self.surface_velocity
            .ok_or_else(|| PhysicsError::FeatureDisabled("surface velocity".to_string()))
    }

    /// Fails unless the record was built with [`JacobianFlags::ENABLE_SURFACE_VELOCITY`]
    pub fn set_surface_velocity(&mut self, velocity: SurfaceVelocity) -> PhysicsResult<()> {
        let slot = self
            .surface_velocity
            .as_mut()
            .ok_or_else(|| PhysicsError::FeatureDisabled("surface velocity".to_string()))?;
        *slot = velocity;
        self.modifiers_changed = true;
        Ok(())
    }

    pub fn angular_changed(&self) -> bool {
        self.angular_changed
    }

    pub fn modifiers_changed(&self) -> bool {
        self.modifiers_changed
    }
}

/// Contact-level data of one contact Jacobian
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiableContactJacobian {
    num_contacts: usize,
    normal: Vec3,
    coefficient_of_friction: f32,
    friction: Option<Jac3dFriction>,
    modified: bool,
}

impl ModifiableContactJacobian {
    pub fn num_contacts(&self) -> usize {
        self.num_contacts
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn set_normal(&mut self, normal: Vec3) {
        self.normal = normal;
        self.modified = true;
    }

    pub fn coefficient_of_friction(&self) -> f32 {
        self.coefficient_of_friction
    }

    pub fn set_coefficient_of_friction(&mut self, friction: f32) {
        self.coefficient_of_friction = friction;
        self.modified = true;
    }

    pub fn friction(&self) -> Option<&Jac3dFriction> {
        self.friction.as_ref()
    }

    /// Friction rows; only their angular parts are written back
    pub fn friction_mut(&mut self) -> PhysicsResult<&mut Jac3dFriction> {
        let friction = self
            .friction
            .as_mut()
            .ok_or_else(|| PhysicsError::FeatureDisabled("friction".to_string()))?;
        self.modified = true;
        Ok(friction)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

pub trait JacobiansJob {
    fn execute(&mut self, header: &mut ModifiableJacobianHeader, jacobian: &mut ModifiableContactJacobian);
}

impl<F> JacobiansJob for F
where
    F: FnMut(&mut ModifiableJacobianHeader, &mut ModifiableContactJacobian),
{
    fn execute(&mut self, header: &mut ModifiableJacobianHeader, jacobian: &mut ModifiableContactJacobian) {
        self(header, jacobian)
    }
}

/// Visit every Jacobian of the fixed grid, then the moving grid. Returns
/// the number of Jacobians visited.
pub fn run_jacobians_job<J>(
    context: &mut StepContext,
    world: &PhysicsWorld,
    time_step: f32,
    job: &mut J,
) -> PhysicsResult<usize>
where
    J: JacobiansJob + ?Sized,
{
    context.require_valid("run_jacobians_job")?;
    let StepContext {
        streams,
        body_index_to_local,
        collision_caches,
        fixed_jacobian_grid,
        moving_jacobian_grid,
        ..
    } = context;

    let mut visited = 0;
    for grid in [&*fixed_jacobian_grid, &*moving_jacobian_grid] {
        for segment in grid.iter().flat_map(LinkedRange::segments) {
            let mut cursor = streams.cursor_mut(segment)?;
            while cursor.has_items() {
                let size = {
                    let mut record = JacobianRecordMut::parse(cursor.peek_mut()?)?;
                    let header = *record.as_record().header()?;
                    let bodies = (
                        body_index_to_local.local(header.body_pair.body_index_a as u32)?,
                        body_index_to_local.local(header.body_pair.body_index_b as u32)?,
                    );
                    let entities = (world.entity(bodies.0)?, world.entity(bodies.1)?);
                    let cache = cache_entry(collision_caches, header.cache_index, STREAM)?;
                    visit_jacobian(&mut record, cache, bodies, entities, time_step, job)?;
                    record.layout().total_size
                };
                cursor.advance(size)?;
                visited += 1;
            }
        }
    }

    log::trace!("[Modify::run_jacobians_job] {} jacobians visited", visited);
    Ok(visited)
}

fn visit_jacobian<J>(
    record: &mut JacobianRecordMut<'_>,
    cache: &mut CollisionCache,
    bodies: (i32, i32),
    entities: (Entity, Entity),
    time_step: f32,
    job: &mut J,
) -> PhysicsResult<()>
where
    J: JacobiansJob + ?Sized,
{
    let flags = cache.jacobian_flags();
    let (mut header_view, mut contact_view) = {
        let view = record.as_record();
        let header = view.header()?;
        let source = view.angular()?;
        let mut angular = [JacAngular::default(); MAX_CONTACT_POINTS];
        angular[..source.len()].copy_from_slice(source);

        let mass_factors = match view.mass_factors()? {
            Some(factors) if flags.contains(JacobianFlags::ENABLE_MASS_FACTORS) => Some(*factors),
            _ => None,
        };
        let surface_velocity = match view.surface_velocity()? {
            Some(_) if flags.contains(JacobianFlags::ENABLE_SURFACE_VELOCITY) => {
                Some(SurfaceVelocity::default())
            }
            _ => None,
        };

        (
            ModifiableJacobianHeader {
                body_index_a: bodies.0,
                body_index_b: bodies.1,
                entity_a: entities.0,
                entity_b: entities.1,
                flags,
                angular,
                num_points: source.len(),
                mass_factors,
                surface_velocity,
                angular_changed: false,
                modifiers_changed: false,
            },
            ModifiableContactJacobian {
                num_contacts: source.len(),
                normal: header.normal(),
                coefficient_of_friction: cache.friction,
                friction: view.friction()?.copied(),
                modified: false,
            },
        )
    };

    job.execute(&mut header_view, &mut contact_view);

    if header_view.flags.contains(JacobianFlags::DISABLED) {
        let header = record.header_mut()?;
        let mut header_flags = header.header_flags();
        header_flags.insert(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL);
        header.set_header_flags(header_flags);
        header.manifold_type = ManifoldType::Disabled as u8;
    }

    if header_view.angular_changed || header_view.modifiers_changed {
        let mut quality = cache.quality_flags();
        quality.remove(QualityFlags::ENABLE_CONTACT_CACHING);
        cache.set_quality_flags(quality);
    }

    if header_view.angular_changed {
        record
            .angular_mut()?
            .copy_from_slice(&header_view.angular[..header_view.num_points]);
    }

    if header_view.modifiers_changed {
        if let (Some(factors), Some(slot)) = (header_view.mass_factors, record.mass_factors_mut()?) {
            *slot = factors;
        }
        if let Some(velocity) = header_view.surface_velocity {
            apply_surface_velocity(record, cache, velocity, contact_view.normal, time_step)?;
        }
    }

    if contact_view.modified {
        let header = record.header_mut()?;
        header.normal = contact_view.normal.to_array();
        header.coefficient_of_friction = contact_view.coefficient_of_friction;
        cache.friction = contact_view.coefficient_of_friction;

        if let (Some(source), Some(target)) = (contact_view.friction, record.friction_mut()?) {
            copy_angular(&mut target.friction0, &source.friction0);
            copy_angular(&mut target.friction1, &source.friction1);
            copy_angular(&mut target.angular_friction, &source.angular_friction);
        }
    }

    Ok(())
}

fn copy_angular(target: &mut FrictionRow, source: &FrictionRow) {
    target.angular_a = source.angular_a;
    target.angular_b = source.angular_b;
}

/// Fold a surface velocity into the friction rows and the cache's
/// integrated friction drive. The first write of a step replaces the
/// stored projection and clears the dirty bit; later writes add to it.
fn apply_surface_velocity(
    record: &mut JacobianRecordMut<'_>,
    cache: &mut CollisionCache,
    velocity: SurfaceVelocity,
    normal: Vec3,
    time_step: f32,
) -> PhysicsResult<()> {
    let angular_projection = velocity.angular.dot(normal);
    let multiplier = cache.friction_rhs_multiplier;

    let drive = multiplier * time_step;
    let delta = [
        -velocity.linear.x,
        -velocity.linear.y,
        -velocity.linear.z,
        -angular_projection,
    ];
    for (accumulated, d) in cache.integrated_friction_rhs.iter_mut().zip(delta) {
        *accumulated += drive * d;
    }

    if record.friction_mut()?.is_none() {
        return Ok(());
    }

    let (dir0, dir1) = friction_basis(normal);
    let projected = [velocity.linear.dot(dir0), velocity.linear.dot(dir1), angular_projection];

    let dirty = {
        let header = record.header_mut()?;
        let mut header_flags = header.header_flags();
        let dirty = header_flags.contains(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY);
        header_flags.remove(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY);
        header.set_header_flags(header_flags);
        dirty
    };
    if let Some(section) = record.surface_velocity_mut()? {
        for (stored, value) in section.projected.iter_mut().zip(projected) {
            if dirty {
                *stored = value;
            } else {
                *stored += value;
            }
        }
    }

    if let Some(friction) = record.friction_mut()? {
        friction.friction0.rhs -= multiplier * projected[0];
        friction.friction1.rhs -= multiplier * projected[1];
        friction.angular_friction.rhs -= multiplier * projected[2];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::records::{
        write_jacobian, BodyIndexPair, JacobianHeader, JacobianRecord, JacobianSections,
        SurfaceVelocitySection,
    };
    use crate::stream::RecordLocation;

    fn world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        for i in 0..2 {
            world.add_static_body(RigidBody::sphere(Entity::new(20 + i, 3), Vec3::ZERO, 1.0));
        }
        world
    }

    fn angular_rows() -> Vec<JacAngular> {
        (0..2)
            .map(|i| JacAngular {
                angular_a: [i as f32, 0.0, 1.0],
                effective_mass: 2.0,
                angular_b: [0.0, -(i as f32), 1.0],
                ..JacAngular::default()
            })
            .collect()
    }

    fn friction() -> Jac3dFriction {
        let (dir0, dir1) = friction_basis(Vec3::Y);
        Jac3dFriction {
            friction0: FrictionRow {
                linear: dir0.to_array(),
                rhs: 0.5,
                ..FrictionRow::default()
            },
            friction1: FrictionRow {
                linear: dir1.to_array(),
                rhs: -0.5,
                ..FrictionRow::default()
            },
            angular_friction: FrictionRow {
                angular_a: [0.0, 1.0, 0.0],
                angular_b: [0.0, -1.0, 0.0],
                ..FrictionRow::default()
            },
        }
    }

    /// One moving-grid Jacobian with friction and every modifier section
    fn context_with_jacobian(flags: JacobianFlags) -> (StepContext, RecordLocation) {
        let mut context = StepContext::new();
        context.begin_step();
        context.body_index_to_local.insert(1, 0);
        context.body_index_to_local.insert(2, 1);

        let pair = BodyIndexPair::new(1, 2);
        let mut cache = CollisionCache::new(pair);
        cache.set_jacobian_flags(flags);
        context.collision_caches.push(cache);

        let mut header = JacobianHeader::new(pair, 0, Vec3::Y);
        header.jacobian_flags = flags.bits();
        header.set_header_flags(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY);
        let rows = angular_rows();
        let sections = JacobianSections {
            angular: &rows,
            friction: Some(friction()),
            surface_velocity: Some(SurfaceVelocitySection::default()),
            normal_velocity: None,
            mass_factors: Some(MassFactors::IDENTITY),
        };

        let id = context.ids.moving_jacobians;
        let stream = context.streams.get_mut(id).expect("stream");
        let mark = stream.mark();
        let location = write_jacobian(stream, &header, &sections).expect("write");
        let range = stream.range_since(id, &mark);
        context.moving_jacobian_grid.push(range);
        (context, location)
    }

    fn record_bytes(context: &StepContext, location: RecordLocation) -> Vec<u8> {
        let stream = context.streams.get(context.ids.moving_jacobians).expect("stream");
        let bytes = stream.record_bytes(location).expect("bytes");
        let size = JacobianRecord::parse(bytes).expect("parse").layout().total_size;
        bytes[..size].to_vec()
    }

    fn parsed(bytes: &[u8]) -> JacobianRecord<'_> {
        JacobianRecord::parse(bytes).expect("parse")
    }

    #[test]
    fn test_untouched_jacobian_is_byte_identical() {
        let (mut context, location) = context_with_jacobian(JacobianFlags::all() - JacobianFlags::DISABLED);
        let before = record_bytes(&context, location);
        let caches_before = context.collision_caches.clone();

        let mut visits = 0;
        let visited = run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |header: &mut ModifiableJacobianHeader, jacobian: &mut ModifiableContactJacobian| {
                visits += 1;
                assert_eq!(header.entity_b(), Entity::new(21, 3));
                assert_eq!(jacobian.num_contacts(), 2);
                assert_eq!(header.angular_jacobians().len(), 2);
            },
        )
        .expect("job");

        assert_eq!((visits, visited), (1, 1));
        assert_eq!(record_bytes(&context, location), before);
        assert_eq!(context.collision_caches, caches_before);
    }

    #[test]
    fn test_contact_fields_leave_angular_and_modifiers_alone() {
        let (mut context, location) = context_with_jacobian(JacobianFlags::ENABLE_MASS_FACTORS);
        let before = record_bytes(&context, location);

        run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |_: &mut ModifiableJacobianHeader, jacobian: &mut ModifiableContactJacobian| {
                jacobian.set_coefficient_of_friction(0.9);
                let friction = jacobian.friction_mut().expect("friction");
                friction.friction0.angular_a = [3.0, 3.0, 3.0];
                friction.friction0.rhs = 100.0;
            },
        )
        .expect("job");

        let after = record_bytes(&context, location);
        let (old, new) = (parsed(&before), parsed(&after));
        assert_eq!(new.angular().expect("angular"), old.angular().expect("angular"));
        assert_eq!(new.mass_factors().expect("mass"), old.mass_factors().expect("mass"));
        assert_eq!(new.surface_velocity().expect("sv"), old.surface_velocity().expect("sv"));

        let row = new.friction().expect("friction").expect("present").friction0;
        assert_eq!(row.angular_a, [3.0, 3.0, 3.0]);
        assert_eq!(row.rhs, 0.5);
        assert_eq!(new.header().expect("header").coefficient_of_friction, 0.9);
        assert_eq!(context.collision_caches[0].friction, 0.9);
        assert!(context.collision_caches[0]
            .quality_flags()
            .contains(QualityFlags::ENABLE_CONTACT_CACHING));
    }

    #[test]
    fn test_angular_change_disables_caching() {
        let (mut context, location) = context_with_jacobian(JacobianFlags::empty());
        run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |header: &mut ModifiableJacobianHeader, _: &mut ModifiableContactJacobian| {
                header.angular_jacobians_mut()[1].effective_mass = 7.0;
            },
        )
        .expect("job");

        let after = record_bytes(&context, location);
        let angular = parsed(&after).angular().expect("angular").to_vec();
        assert_eq!(angular[0].effective_mass, 2.0);
        assert_eq!(angular[1].effective_mass, 7.0);
        assert!(!context.collision_caches[0]
            .quality_flags()
            .contains(QualityFlags::ENABLE_CONTACT_CACHING));
    }

    #[test]
    fn test_disabled_sections_are_rejected() {
        let (mut context, _) = context_with_jacobian(JacobianFlags::empty());
        run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |header: &mut ModifiableJacobianHeader, _: &mut ModifiableContactJacobian| {
                assert!(matches!(
                    header.set_mass_factors(MassFactors::IDENTITY),
                    Err(PhysicsError::FeatureDisabled(_))
                ));
                assert!(header.set_surface_velocity(SurfaceVelocity::default()).is_err());
                assert!(!header.modifiers_changed());
            },
        )
        .expect("job");
    }

    #[test]
    fn test_mass_factor_write_back() {
        let (mut context, location) = context_with_jacobian(JacobianFlags::ENABLE_MASS_FACTORS);
        let mut factors = MassFactors::IDENTITY;
        factors.inverse_mass_factor_a = 0.0;
        run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |header: &mut ModifiableJacobianHeader, _: &mut ModifiableContactJacobian| {
                header.set_mass_factors(factors).expect("enabled");
            },
        )
        .expect("job");

        let after = record_bytes(&context, location);
        assert_eq!(parsed(&after).mass_factors().expect("mass"), Some(&factors));
    }

    #[test]
    fn test_disable_through_jacobian_flags() {
        let (mut context, location) = context_with_jacobian(JacobianFlags::empty());
        run_jacobians_job(
            &mut context,
            &world(),
            1.0 / 60.0,
            &mut |header: &mut ModifiableJacobianHeader, _: &mut ModifiableContactJacobian| {
                header.set_flags(header.flags() | JacobianFlags::DISABLED);
            },
        )
        .expect("job");

        let after = record_bytes(&context, location);
        let header = *parsed(&after).header().expect("header");
        assert!(header
            .header_flags()
            .contains(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL));
        assert_eq!(header.manifold_type(), Some(ManifoldType::Disabled));
    }

    #[test]
    fn test_surface_velocity_initialises_then_accumulates() {
        let time_step = 0.5;
        let (mut context, location) = context_with_jacobian(JacobianFlags::ENABLE_SURFACE_VELOCITY);
        let velocity = SurfaceVelocity {
            linear: Vec3::new(2.0, 0.0, 0.0),
            angular: Vec3::new(0.0, 4.0, 0.0),
        };
        let (dir0, dir1) = friction_basis(Vec3::Y);
        let expected = [velocity.linear.dot(dir0), velocity.linear.dot(dir1), 4.0];

        let mut job = |header: &mut ModifiableJacobianHeader, _: &mut ModifiableContactJacobian| {
            header.set_surface_velocity(velocity).expect("enabled");
        };

        run_jacobians_job(&mut context, &world(), time_step, &mut job).expect("first pass");
        let first = record_bytes(&context, location);
        let record = parsed(&first);
        assert_eq!(record.surface_velocity().expect("sv").expect("present").projected, expected);
        assert!(!record
            .header()
            .expect("header")
            .header_flags()
            .contains(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY));
        let rows = record.friction().expect("friction").expect("present");
        assert_eq!(rows.friction0.rhs, 0.5 - expected[0]);
        assert_eq!(rows.angular_friction.rhs, -4.0);
        assert_eq!(context.collision_caches[0].integrated_friction_rhs, [-1.0, 0.0, 0.0, -2.0]);

        run_jacobians_job(&mut context, &world(), time_step, &mut job).expect("second pass");
        let second = record_bytes(&context, location);
        let record = parsed(&second);
        let doubled = expected.map(|v| v * 2.0);
        assert_eq!(record.surface_velocity().expect("sv").expect("present").projected, doubled);
        assert_eq!(
            record.friction().expect("friction").expect("present").angular_friction.rhs,
            -8.0
        );
        assert_eq!(context.collision_caches[0].integrated_friction_rhs, [-2.0, 0.0, 0.0, -4.0]);
    }
}
