//! Trigger events: body pairs that overlapped a trigger this step

use super::RangeCursor;
use crate::body::{Entity, PhysicsWorld};
use crate::error::{PhysicsError, PhysicsResult};
use crate::pipeline::{BodyIdTable, StepContext};
use crate::records::TriggerEventRecord;
use crate::stream::{LinkedRange, StreamArena};

const RECORD_SIZE: usize = std::mem::size_of::<TriggerEventRecord>();

#[derive(Debug, Clone, Copy)]
pub struct TriggerEvents<'a> {
    streams: &'a StreamArena,
    ids: &'a BodyIdTable,
    range: Option<&'a LinkedRange>,
    world: &'a PhysicsWorld,
}

impl<'a> TriggerEvents<'a> {
    pub fn new(context: &'a StepContext, world: &'a PhysicsWorld) -> Self {
        Self {
            streams: &context.streams,
            ids: &context.body_index_to_local,
            range: context.trigger_events.as_ref(),
            world,
        }
    }

    pub fn iter(&self) -> TriggerEventsIter<'a> {
        TriggerEventsIter {
            events: *self,
            cursor: RangeCursor::new(self.streams, self.range),
        }
    }

    pub fn len(&self) -> usize {
        self.range.map(LinkedRange::total_elements).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn event(&self, bytes: &[u8]) -> PhysicsResult<TriggerEvent> {
        let record: TriggerEventRecord = bytes
            .get(..RECORD_SIZE)
            .map(bytemuck::pod_read_unaligned)
            .ok_or_else(|| PhysicsError::corrupted("trigger events", "truncated trigger event"))?;
        let body_index_a = self.ids.local(record.body_pair.body_index_a as u32)?;
        let body_index_b = self.ids.local(record.body_pair.body_index_b as u32)?;
        Ok(TriggerEvent {
            body_index_a,
            body_index_b,
            entity_a: self.world.entity(body_index_a)?,
            entity_b: self.world.entity(body_index_b)?,
            collider_key_a: record.collider_key_a,
            collider_key_b: record.collider_key_b,
        })
    }
}

impl<'a> IntoIterator for TriggerEvents<'a> {
    type Item = PhysicsResult<TriggerEvent>;
    type IntoIter = TriggerEventsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TriggerEventsIter<'a> {
    events: TriggerEvents<'a>,
    cursor: RangeCursor<'a>,
}

impl<'a> Iterator for TriggerEventsIter<'a> {
    type Item = PhysicsResult<TriggerEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.cursor.next_record(|_| Ok(RECORD_SIZE))?;
        Some(bytes.and_then(|bytes| self.events.event(bytes)))
    }
}

/// A body pair where at least one body is a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub body_index_a: i32,
    pub body_index_b: i32,
    pub entity_a: Entity,
    pub entity_b: Entity,
    pub collider_key_a: u32,
    pub collider_key_b: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::records::BodyIndexPair;
    use glam::Vec3;

    #[test]
    fn test_trigger_events_restart() {
        let mut world = PhysicsWorld::new();
        for i in 0..3 {
            world.add_static_body(RigidBody::sphere(Entity::new(i, 0), Vec3::ZERO, 1.0));
        }

        let mut context = StepContext::new();
        context.begin_step();
        for i in 0..3u32 {
            context.body_index_to_local.insert(i + 1, i as i32);
        }
        let id = context.ids.moving_trigger_events;
        let stream = context.streams.get_mut(id).expect("stream");
        let mark = stream.mark();
        for (a, b) in [(1, 2), (1, 3), (2, 3)] {
            stream.append(&TriggerEventRecord {
                body_pair: BodyIndexPair::new(a, b),
                collider_key_a: 0,
                collider_key_b: 7,
            });
        }
        context.trigger_events = Some(stream.range_since(id, &mark));

        let events = TriggerEvents::new(&context, &world);
        let first: Vec<TriggerEvent> = events.iter().collect::<PhysicsResult<_>>().expect("events");
        let second: Vec<TriggerEvent> = events.into_iter().collect::<PhysicsResult<_>>().expect("events");
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].entity_b, Entity::new(2, 0));
        assert_eq!(first[2].collider_key_b, 7);
    }

    #[test]
    fn test_unknown_body_id_is_reported() {
        let world = PhysicsWorld::new();
        let mut context = StepContext::new();
        context.begin_step();
        let id = context.ids.fixed_trigger_events;
        let stream = context.streams.get_mut(id).expect("stream");
        let mark = stream.mark();
        stream.append(&TriggerEventRecord {
            body_pair: BodyIndexPair::new(5, 6),
            collider_key_a: 0,
            collider_key_b: 0,
        });
        context.trigger_events = Some(stream.range_since(id, &mark));

        let mut iter = TriggerEvents::new(&context, &world).iter();
        assert!(iter.next().expect("one record").is_err());
        assert!(iter.next().is_none());
    }
}
