//! Body pair modification, run after the broadphase

use crate::body::{Entity, PhysicsWorld};
use crate::error::PhysicsResult;
use crate::pipeline::StepContext;
use crate::records::BodyIndexPair;

/// One broadphase pair as seen by a [`BodyPairsJob`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifiableBodyPair {
    body_index_a: i32,
    body_index_b: i32,
    entity_a: Entity,
    entity_b: Entity,
    disabled: bool,
}

impl ModifiableBodyPair {
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

    /// Skip this pair in the narrowphase
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

pub trait BodyPairsJob {
    fn execute(&mut self, pair: &mut ModifiableBodyPair);
}

impl<F> BodyPairsJob for F
where
    F: FnMut(&mut ModifiableBodyPair),
{
    fn execute(&mut self, pair: &mut ModifiableBodyPair) {
        self(pair)
    }
}

/// Visit every valid pair; disabled pairs are rewritten as [`BodyIndexPair::INVALID`].
/// Returns the number of pairs disabled.
pub fn run_body_pairs_job<J>(
    context: &mut StepContext,
    world: &PhysicsWorld,
    job: &mut J,
) -> PhysicsResult<usize>
where
    J: BodyPairsJob + ?Sized,
{
    context.require_valid("run_body_pairs_job")?;
    let StepContext {
        streams,
        body_pairs,
        body_index_to_local,
        ..
    } = context;

    let mut disabled = 0;
    for segment in body_pairs.segments() {
        let mut cursor = streams.cursor_mut(segment)?;
        while cursor.has_items() {
            let pair: BodyIndexPair = cursor.read_copy()?;
            if !pair.is_valid() {
                continue;
            }

            let body_index_a = body_index_to_local.local(pair.body_index_a as u32)?;
            let body_index_b = body_index_to_local.local(pair.body_index_b as u32)?;
            let mut view = ModifiableBodyPair {
                body_index_a,
                body_index_b,
                entity_a: world.entity(body_index_a)?,
                entity_b: world.entity(body_index_b)?,
                disabled: false,
            };
            job.execute(&mut view);

            if view.disabled {
                cursor.rewrite_last(&BodyIndexPair::INVALID)?;
                disabled += 1;
            }
        }
    }

    log::trace!("[Modify::run_body_pairs_job] {} pairs disabled", disabled);
    Ok(disabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use glam::Vec3;

    fn context_with_pairs(pairs: &[(u32, u32)]) -> StepContext {
        let mut context = StepContext::new();
        context.begin_step();
        for index in 0..4 {
            context.body_index_to_local.insert(index + 1, index as i32);
        }
        let id = context.ids.body_pairs;
        let stream = context.streams.get_mut(id).expect("stream");
        let mark = stream.mark();
        for &(a, b) in pairs {
            stream.append(&BodyIndexPair::new(a as i32, b as i32));
        }
        context.body_pairs = stream.range_since(id, &mark);
        context
    }

    fn world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        for i in 0..4 {
            world.add_static_body(RigidBody::sphere(Entity::new(i, 1), Vec3::ZERO, 1.0));
        }
        world
    }

    #[test]
    fn test_disabled_pairs_become_invalid() {
        let mut context = context_with_pairs(&[(1, 2), (2, 3), (3, 4)]);
        let world = world();

        let mut seen = Vec::new();
        let disabled = run_body_pairs_job(&mut context, &world, &mut |pair: &mut ModifiableBodyPair| {
            seen.push((pair.body_index_a(), pair.entity_b().index));
            if pair.body_index_a() == 1 {
                pair.disable();
            }
        })
        .expect("job");

        assert_eq!(disabled, 1);
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3)]);

        let stream = context.streams.get(context.ids.body_pairs).expect("stream");
        let mut reader = stream.reader();
        let mut stored = Vec::new();
        while reader.has_items() {
            stored.push(reader.read_copy::<BodyIndexPair>().expect("pair"));
        }
        assert_eq!(stored[1], BodyIndexPair::INVALID);
        assert_eq!(stored[2], BodyIndexPair::new(3, 4));
    }

    #[test]
    fn test_invalid_pairs_are_skipped() {
        let mut context = context_with_pairs(&[(1, 2)]);
        let world = world();
        run_body_pairs_job(&mut context, &world, &mut |pair: &mut ModifiableBodyPair| pair.disable())
            .expect("first pass");

        let mut calls = 0;
        run_body_pairs_job(&mut context, &world, &mut |_: &mut ModifiableBodyPair| calls += 1)
            .expect("second pass");
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_requires_step_in_progress() {
        let mut context = StepContext::new();
        let result = run_body_pairs_job(&mut context, &world(), &mut |_: &mut ModifiableBodyPair| {});
        assert!(result.is_err());
    }
}
