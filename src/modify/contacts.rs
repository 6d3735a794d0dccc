//! Contact modification, run after the narrowphase
//!
//! The callback runs once per contact point with the manifold's header view
//! and the point's view. Points are written back as they are visited; the
//! header is written back once all points of its manifold were visited,
//! together with the collision-cache state derived from it.

use glam::Vec3;

use crate::body::{Entity, PhysicsWorld};
use crate::error::PhysicsResult;
use crate::pipeline::step_context::cache_entry;
use crate::pipeline::StepContext;
use crate::records::{
    CollisionCache, CollisionFlags, ContactPointRecord, JacobianFlags, ManifoldDataFields,
    ManifoldHeader, ManifoldStreamHeader, ManifoldType, ManifoldViewMut, MassFactors,
    QualityFlags,
};

const STREAM: &str = "manifolds";

/// Manifold-level data of the contact being visited
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiableContactHeader {
    body_index_a: i32,
    body_index_b: i32,
    entity_a: Entity,
    entity_b: Entity,
    collider_key_a: u32,
    collider_key_b: u32,
    num_contacts: usize,

    normal: Vec3,
    coefficient_of_friction: f32,
    coefficient_of_restitution: f32,
    custom_tags_a: u8,
    custom_tags_b: u8,
    jacobian_flags: JacobianFlags,

    modified: bool,
}

impl ModifiableContactHeader {
    fn new(
        header: &ManifoldHeader,
        cache: &CollisionCache,
        bodies: (i32, i32),
        entities: (Entity, Entity),
    ) -> Self {
        let (custom_tags_a, custom_tags_b) = cache.custom_tags();
        Self {
            body_index_a: bodies.0,
            body_index_b: bodies.1,
            entity_a: entities.0,
            entity_b: entities.1,
            collider_key_a: header.collider_key_a,
            collider_key_b: header.collider_key_b,
            num_contacts: header.num_points as usize,
            normal: header.normal(),
            coefficient_of_friction: cache.friction,
            coefficient_of_restitution: cache.restitution,
            custom_tags_a,
            custom_tags_b,
            jacobian_flags: cache.jacobian_flags(),
            modified: false,
        }
    }

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

    pub fn collider_keys(&self) -> (u32, u32) {
        (self.collider_key_a, self.collider_key_b)
    }

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

    pub fn coefficient_of_restitution(&self) -> f32 {
        self.coefficient_of_restitution
    }

    pub fn set_coefficient_of_restitution(&mut self, restitution: f32) {
        self.coefficient_of_restitution = restitution;
        self.modified = true;
    }

    pub fn custom_tags(&self) -> (u8, u8) {
        (self.custom_tags_a, self.custom_tags_b)
    }

    pub fn set_custom_tags(&mut self, tags_a: u8, tags_b: u8) {
        self.custom_tags_a = tags_a;
        self.custom_tags_b = tags_b;
        self.modified = true;
    }

    pub fn jacobian_flags(&self) -> JacobianFlags {
        self.jacobian_flags
    }

    pub fn set_jacobian_flags(&mut self, flags: JacobianFlags) {
        self.jacobian_flags = flags;
        self.modified = true;
    }

    /// Set or clear one flag
    pub fn set_flag(&mut self, flag: JacobianFlags, enabled: bool) {
        self.jacobian_flags.set(flag, enabled);
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn write_back(&self, header: &mut ManifoldHeader, cache: &mut CollisionCache) {
        header.normal = self.normal.to_array();
        cache.friction = self.coefficient_of_friction;
        cache.restitution = self.coefficient_of_restitution;
        cache.set_custom_tags(self.custom_tags_a, self.custom_tags_b);
        cache.set_jacobian_flags(self.jacobian_flags);

        let flags = self.jacobian_flags;
        let mut collision_flags = cache.collision_flags();
        if flags.contains(JacobianFlags::DISABLED) {
            header.manifold_type = ManifoldType::Disabled as u32;
            collision_flags |= CollisionFlags::DONT_BUILD_CONTACT_JACOBIANS;
            let mut quality = cache.quality_flags();
            quality.remove(QualityFlags::ENABLE_CONTACT_CACHING);
            cache.set_quality_flags(quality);
        } else {
            if flags.contains(JacobianFlags::ENABLE_MASS_FACTORS) {
                let mut data_fields = header.data_fields();
                data_fields.insert(ManifoldDataFields::INERTIA_MODIFIED);
                data_fields.remove(ManifoldDataFields::CONTAINS_TRIANGLE);
                header.data_fields = data_fields.bits();
                header.mass_factors = MassFactors::IDENTITY;
            }
            if flags.contains(JacobianFlags::IS_TRIGGER) {
                header.manifold_type = ManifoldType::Trigger as u32;
            }
            if flags.contains(JacobianFlags::ENABLE_SURFACE_VELOCITY) {
                collision_flags |= CollisionFlags::ENABLE_SURFACE_VELOCITY;
            }
            if self.coefficient_of_restitution != 0.0 {
                collision_flags |= CollisionFlags::ENABLE_RESTITUTION;
            }
        }
        cache.set_collision_flags(collision_flags);
    }
}

/// One contact point of the manifold being visited
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifiableContactPoint {
    index: usize,
    position: Vec3,
    distance: f32,
    modified: bool,
}

impl ModifiableContactPoint {
    /// Index of the point inside its manifold
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.modified = true;
    }

    /// Signed separation; negative when penetrating
    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance;
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

pub trait ContactsJob {
    fn execute(&mut self, header: &mut ModifiableContactHeader, contact: &mut ModifiableContactPoint);
}

impl<F> ContactsJob for F
where
    F: FnMut(&mut ModifiableContactHeader, &mut ModifiableContactPoint),
{
    fn execute(&mut self, header: &mut ModifiableContactHeader, contact: &mut ModifiableContactPoint) {
        self(header, contact)
    }
}

/// Visit every contact point of every manifold. Returns the number of
/// manifolds whose header was written back.
pub fn run_contacts_job<J>(
    context: &mut StepContext,
    world: &PhysicsWorld,
    job: &mut J,
) -> PhysicsResult<usize>
where
    J: ContactsJob + ?Sized,
{
    context.require_valid("run_contacts_job")?;
    let StepContext {
        streams,
        manifolds,
        body_index_to_local,
        collision_caches,
        ..
    } = context;

    let mut headers_written = 0;
    for segment in manifolds.segments() {
        let mut cursor = streams.cursor_mut(segment)?;
        while cursor.has_items() {
            let pair_header: ManifoldStreamHeader = cursor.read_copy()?;
            let body_index_a = body_index_to_local.local(pair_header.body_pair.body_index_a as u32)?;
            let body_index_b = body_index_to_local.local(pair_header.body_pair.body_index_b as u32)?;
            let entities = (world.entity(body_index_a)?, world.entity(body_index_b)?);

            for _ in 0..pair_header.num_manifolds {
                let size = {
                    let manifold = ManifoldViewMut::parse(cursor.peek_mut()?)?;
                    let size = manifold.header.record_size();
                    let cache = cache_entry(collision_caches, manifold.header.cache_index, STREAM)?;
                    if visit_manifold(manifold, cache, (body_index_a, body_index_b), entities, job) {
                        headers_written += 1;
                    }
                    size
                };
                cursor.advance(size)?;
            }
        }
    }

    log::trace!("[Modify::run_contacts_job] {} manifold headers written back", headers_written);
    Ok(headers_written)
}

fn visit_manifold<J>(
    manifold: ManifoldViewMut<'_>,
    cache: &mut CollisionCache,
    bodies: (i32, i32),
    entities: (Entity, Entity),
    job: &mut J,
) -> bool
where
    J: ContactsJob + ?Sized,
{
    let ManifoldViewMut { header, points } = manifold;
    let mut header_view = ModifiableContactHeader::new(header, cache, bodies, entities);

    for (index, point) in points.iter_mut().enumerate() {
        let mut point_view = ModifiableContactPoint {
            index,
            position: point.position(),
            distance: point.distance,
            modified: false,
        };
        job.execute(&mut header_view, &mut point_view);
        if point_view.modified {
            *point = ContactPointRecord::new(point_view.position, point_view.distance);
        }
    }

    if header_view.modified {
        header_view.write_back(header, cache);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::records::{write_manifold, BodyIndexPair, ManifoldView};

    fn world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        for i in 0..3 {
            world.add_static_body(RigidBody::sphere(Entity::new(10 + i, 1), Vec3::ZERO, 1.0));
        }
        world
    }

    /// One pair (ids 1, 2) with two manifolds of 2 and 1 points
    fn context_with_manifolds() -> StepContext {
        let mut context = StepContext::new();
        context.begin_step();
        for index in 0..3 {
            context.body_index_to_local.insert(index + 1, index as i32);
        }

        let id = context.ids.manifolds;
        let pair = BodyIndexPair::new(1, 2);
        let stream = context.streams.get_mut(id).expect("stream");
        let mark = stream.mark();
        stream.append(&ManifoldStreamHeader {
            body_pair: pair,
            num_manifolds: 2,
            _padding: 0,
        });
        for (cache_index, count) in [(0u32, 2usize), (1, 1)] {
            let points: Vec<_> = (0..count)
                .map(|i| ContactPointRecord::new(Vec3::new(i as f32, 0.0, 0.0), -0.1))
                .collect();
            write_manifold(stream, &ManifoldHeader::new(Vec3::Y, count, cache_index), &points)
                .expect("write");
        }
        context.manifolds = stream.range_since(id, &mark);
        context.collision_caches = vec![CollisionCache::new(pair), CollisionCache::new(pair)];
        context
    }

    fn manifold_headers(context: &StepContext) -> Vec<(ManifoldHeader, Vec<ContactPointRecord>)> {
        let mut reader = context.streams.reader(&context.manifolds).expect("reader");
        let mut out = Vec::new();
        while reader.has_items() {
            let pair: ManifoldStreamHeader = reader.read_copy().expect("pair header");
            for _ in 0..pair.num_manifolds {
                let view = ManifoldView::parse(reader.peek().expect("peek")).expect("parse");
                out.push((*view.header, view.points.to_vec()));
                let size = view.record_size();
                reader.advance(size).expect("advance");
            }
        }
        out
    }

    #[test]
    fn test_untouched_records_stay_identical() {
        let mut context = context_with_manifolds();
        let before = manifold_headers(&context);
        let caches_before = context.collision_caches.clone();

        let mut visits = 0;
        let written = run_contacts_job(
            &mut context,
            &world(),
            &mut |header: &mut ModifiableContactHeader, _: &mut ModifiableContactPoint| {
                visits += 1;
                assert_eq!(header.entity_a(), Entity::new(10, 1));
            },
        )
        .expect("job");

        assert_eq!(visits, 3);
        assert_eq!(written, 0);
        assert_eq!(manifold_headers(&context), before);
        assert_eq!(context.collision_caches, caches_before);
    }

    #[test]
    fn test_point_write_back() {
        let mut context = context_with_manifolds();
        run_contacts_job(
            &mut context,
            &world(),
            &mut |_: &mut ModifiableContactHeader, point: &mut ModifiableContactPoint| {
                if point.index() == 1 {
                    point.set_distance(0.25);
                }
            },
        )
        .expect("job");

        let manifolds = manifold_headers(&context);
        assert_eq!(manifolds[0].1[0].distance, -0.1);
        assert_eq!(manifolds[0].1[1].distance, 0.25);
        assert_eq!(manifolds[1].1[0].distance, -0.1);
    }

    #[test]
    fn test_disable_turns_off_caching() {
        let mut context = context_with_manifolds();
        run_contacts_job(
            &mut context,
            &world(),
            &mut |header: &mut ModifiableContactHeader, _: &mut ModifiableContactPoint| {
                if header.num_contacts() == 1 {
                    header.set_flag(JacobianFlags::DISABLED, true);
                }
            },
        )
        .expect("job");

        let manifolds = manifold_headers(&context);
        assert_eq!(manifolds[0].0.manifold_type(), Some(ManifoldType::Normal));
        assert_eq!(manifolds[1].0.manifold_type(), Some(ManifoldType::Disabled));

        let cache = &context.collision_caches[1];
        assert!(cache.jacobian_flags().contains(JacobianFlags::DISABLED));
        assert!(cache
            .collision_flags()
            .contains(CollisionFlags::DONT_BUILD_CONTACT_JACOBIANS));
        assert!(!cache.quality_flags().contains(QualityFlags::ENABLE_CONTACT_CACHING));
        assert!(context.collision_caches[0]
            .quality_flags()
            .contains(QualityFlags::ENABLE_CONTACT_CACHING));
    }

    #[test]
    fn test_derived_flags() {
        let mut context = context_with_manifolds();
        run_contacts_job(
            &mut context,
            &world(),
            &mut |header: &mut ModifiableContactHeader, _: &mut ModifiableContactPoint| {
                header.set_coefficient_of_restitution(0.5);
                header.set_flag(JacobianFlags::ENABLE_SURFACE_VELOCITY, true);
                header.set_flag(JacobianFlags::ENABLE_MASS_FACTORS, true);
                header.set_flag(JacobianFlags::IS_TRIGGER, header.num_contacts() == 2);
                header.set_normal(Vec3::X);
            },
        )
        .expect("job");

        let manifolds = manifold_headers(&context);
        assert_eq!(manifolds[0].0.manifold_type(), Some(ManifoldType::Trigger));
        assert_eq!(manifolds[1].0.manifold_type(), Some(ManifoldType::Normal));
        for (header, _) in &manifolds {
            assert_eq!(header.normal(), Vec3::X);
            assert!(header.data_fields().contains(ManifoldDataFields::INERTIA_MODIFIED));
            assert_eq!(header.mass_factors, MassFactors::IDENTITY);
        }
        for cache in &context.collision_caches {
            assert_eq!(cache.restitution, 0.5);
            let flags = cache.collision_flags();
            assert!(flags.contains(CollisionFlags::ENABLE_RESTITUTION));
            assert!(flags.contains(CollisionFlags::ENABLE_SURFACE_VELOCITY));
        }
    }
}
