//! Sphere-sphere narrowphase
//!
//! Every surviving broadphase pair closer than the collision tolerance gets
//! one manifold with a single speculative contact point on body B's
//! surface, plus a collision cache entry describing how the solver treats it.

use glam::Vec3;

use super::ReferenceWorld;
use crate::body::CollisionResponse;
use crate::error::PhysicsResult;
use crate::pipeline::StepContext;
use crate::records::{
    write_manifold, BodyIndexPair, CollisionCache, CollisionFlags, ContactPointRecord, JacobianFlags,
    ManifoldHeader, ManifoldStreamHeader, ManifoldType,
};

/// Closest points of two spheres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereContact {
    /// From A towards B
    pub normal: Vec3,
    /// On B's surface
    pub position: Vec3,
    /// Negative when penetrating
    pub distance: f32,
}

pub fn sphere_contact(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
    tolerance: f32,
) -> Option<SphereContact> {
    let delta = center_b - center_a;
    let length = delta.length();
    let distance = length - radius_a - radius_b;
    if distance > tolerance {
        return None;
    }
    // Coincident centres push apart along +Y
    let normal = if length > 1e-6 { delta / length } else { Vec3::Y };
    Some(SphereContact {
        normal,
        position: center_b - normal * radius_b,
        distance,
    })
}

/// Collision cache of a new manifold between engine bodies `a` and `b`
fn build_cache(world: &ReferenceWorld, pair: BodyIndexPair, a: usize, b: usize) -> CollisionCache {
    let mut cache = CollisionCache::new(pair);
    let (Some(body_a), Some(body_b)) = (world.body(a), world.body(b)) else {
        return cache;
    };

    cache.friction = (body_a.friction.max(0.0) * body_b.friction.max(0.0)).sqrt();
    cache.restitution = body_a.restitution.max(body_b.restitution);
    let (tags_a, tags_b) = (body_a.custom_tags as u8, body_b.custom_tags as u8);
    cache.set_custom_tags(tags_a, tags_b);

    let mut jacobian_flags = JacobianFlags::empty();
    let responses = [body_a.response(), body_b.response()];
    if responses.contains(&CollisionResponse::RaiseTriggerEvents) {
        jacobian_flags |= JacobianFlags::IS_TRIGGER;
    } else if responses.contains(&CollisionResponse::RaiseCollisionEvents) {
        jacobian_flags |= JacobianFlags::ENABLE_COLLISION_EVENTS;
    }
    cache.set_jacobian_flags(jacobian_flags);

    let mut collision_flags = CollisionFlags::empty();
    if (tags_a | tags_b) & world.config.body_tags_for_contact_welding != 0 {
        collision_flags |= CollisionFlags::ENABLE_CONTACT_WELDING;
    }
    if cache.restitution != 0.0 {
        collision_flags |= CollisionFlags::ENABLE_RESTITUTION;
    }
    cache.set_collision_flags(collision_flags);

    let key = (pair.body_index_a as u32, pair.body_index_b as u32);
    cache.cached_impulse = world.warm_start.get(&key).copied().unwrap_or(0.0);
    cache
}

/// Turn valid body pairs into manifolds. Returns the number of manifolds.
pub(crate) fn create_manifolds(world: &ReferenceWorld, context: &mut StepContext) -> PhysicsResult<usize> {
    let StepContext {
        streams,
        ids,
        body_pairs,
        manifolds,
        body_index_to_local,
        collision_caches,
        ..
    } = context;

    let mut pairs = Vec::with_capacity(body_pairs.total_elements());
    for segment in body_pairs.segments() {
        let mut reader = streams.reader(segment)?;
        while reader.has_items() {
            let pair: BodyIndexPair = reader.read_copy()?;
            if pair.is_valid() {
                pairs.push(pair);
            }
        }
    }

    let tolerance = world.config.solver.collision_tolerance;
    let stream = streams.get_mut(ids.manifolds)?;
    let mark = stream.mark();
    let mut created = 0;
    for pair in pairs {
        let a = body_index_to_local.local(pair.body_index_a as u32)? as usize;
        let b = body_index_to_local.local(pair.body_index_b as u32)? as usize;
        let (Some(body_a), Some(body_b)) = (world.body(a), world.body(b)) else {
            continue;
        };
        let Some(contact) = sphere_contact(
            world.position(a),
            body_a.collider_radius,
            world.position(b),
            body_b.collider_radius,
            tolerance,
        ) else {
            continue;
        };

        let cache = build_cache(world, pair, a, b);
        let mut header = ManifoldHeader::new(contact.normal, 1, collision_caches.len() as u32);
        if cache.jacobian_flags().contains(JacobianFlags::IS_TRIGGER) {
            header.manifold_type = ManifoldType::Trigger as u32;
        }
        collision_caches.push(cache);

        stream.append(&ManifoldStreamHeader {
            body_pair: pair,
            num_manifolds: 1,
            _padding: 0,
        });
        write_manifold(
            stream,
            &header,
            &[ContactPointRecord::new(contact.position, contact.distance)],
        )?;
        created += 1;
    }

    *manifolds = stream.range_since(ids.manifolds, &mark);
    Ok(created)
}
