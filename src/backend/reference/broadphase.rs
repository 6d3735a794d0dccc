//! Sweep-and-prune broadphase
//!
//! Bodies are projected onto X, sorted by their lower bound and swept with
//! an active list. Pairs come out ordered by engine index, so when one body
//! is static the dynamic one is body A.

use super::aabb::{aabb_from_sphere, aabb_intersects, aabb_is_finite, aabb_swept, world_bounds_aabb, AABB};
use super::ReferenceWorld;
use crate::body::CollisionResponse;
use crate::error::PhysicsResult;
use crate::pipeline::StepContext;
use crate::records::BodyIndexPair;

/// Bounds of every body that takes part in collision detection
fn body_bounds(world: &ReferenceWorld) -> Vec<Option<AABB>> {
    let limits = world_bounds_aabb(&world.config.world_bounds);
    let margin = world.config.solver.collision_tolerance;
    let time_step = world.parameters.time_step;

    (0..world.num_bodies())
        .map(|index| {
            let body = world.body(index)?;
            if body.response() == CollisionResponse::None {
                return None;
            }
            let mut aabb = aabb_from_sphere(world.position(index), body.collider_radius, margin);
            if world.is_awake(index) {
                aabb = aabb_swept(&aabb, world.solver_body(index).linear, time_step);
            }
            (aabb_is_finite(&aabb) && aabb_intersects(&limits, &aabb)).then_some(aabb)
        })
        .collect()
}

/// Overlapping pairs `(i, k)` with `i < k`, sorted
pub fn sweep_and_prune(aabbs: &[Option<AABB>]) -> Vec<(usize, usize)> {
    #[derive(Clone, Copy)]
    struct Projection {
        min: f32,
        index: usize,
    }

    let mut projections: Vec<Projection> = aabbs
        .iter()
        .enumerate()
        .filter_map(|(index, aabb)| aabb.map(|a| Projection { min: a.min.x, index }))
        .collect();
    projections.sort_by(|a, b| a.min.total_cmp(&b.min).then(a.index.cmp(&b.index)));

    let mut active: Vec<(usize, AABB)> = Vec::new();
    let mut pairs = Vec::new();
    for projection in projections {
        let Some(current) = aabbs[projection.index] else {
            continue;
        };
        active.retain(|(_, other)| other.max.x >= projection.min);
        for &(other_index, other) in &active {
            if aabb_intersects(&current, &other) {
                let (i, k) = if other_index < projection.index {
                    (other_index, projection.index)
                } else {
                    (projection.index, other_index)
                };
                pairs.push((i, k));
            }
        }
        active.push((projection.index, current));
    }

    pairs.sort_unstable();
    pairs
}

/// Write candidate pairs into the body pair stream. Pairs without an awake
/// dynamic body are skipped.
pub(crate) fn find_pairs(world: &ReferenceWorld, context: &mut StepContext) -> PhysicsResult<usize> {
    let aabbs = body_bounds(world);
    let pairs: Vec<(usize, usize)> = sweep_and_prune(&aabbs)
        .into_iter()
        .filter(|&(a, b)| world.is_awake(a) || world.is_awake(b))
        .collect();

    let id = context.ids.body_pairs;
    let stream = context.streams.get_mut(id)?;
    let mark = stream.mark();
    for &(a, b) in &pairs {
        stream.append(&BodyIndexPair::new(
            ReferenceWorld::body_id(a) as i32,
            ReferenceWorld::body_id(b) as i32,
        ));
    }
    context.body_pairs = stream.range_since(id, &mark);
    Ok(pairs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn spheres(centers: &[f32]) -> Vec<Option<AABB>> {
        centers
            .iter()
            .map(|&x| Some(aabb_from_sphere(Vec3::new(x, 0.0, 0.0), 1.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_sweep_finds_overlaps_only() {
        let pairs = sweep_and_prune(&spheres(&[0.0, 1.5, 10.0, 3.0]));
        assert_eq!(pairs, vec![(0, 1), (1, 3)]);
    }

    #[test]
    fn test_excluded_bodies_are_skipped() {
        let mut aabbs = spheres(&[0.0, 0.5, 1.0]);
        aabbs[1] = None;
        assert_eq!(sweep_and_prune(&aabbs), vec![(0, 2)]);
    }

    #[test]
    fn test_sweep_matches_brute_force() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let aabbs: Vec<Option<AABB>> = (0..64)
            .map(|_| {
                let center = Vec3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                );
                Some(aabb_from_sphere(center, rng.gen_range(0.1..2.0), 0.0))
            })
            .collect();

        let mut expected = Vec::new();
        for i in 0..aabbs.len() {
            for k in i + 1..aabbs.len() {
                if let (Some(a), Some(b)) = (aabbs[i], aabbs[k]) {
                    if aabb_intersects(&a, &b) {
                        expected.push((i, k));
                    }
                }
            }
        }
        assert_eq!(sweep_and_prune(&aabbs), expected);
    }
}
