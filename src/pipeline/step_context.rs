//! Step context - the streams and tables one step produces
//!
//! Owned by a world's [`Simulation`](super::Simulation) and reset at the
//! start of every step. Nothing in here may be retained across steps.

use crate::constants::body::BODY_ID_MASK;
use crate::error::{PhysicsError, PhysicsResult};
use crate::records::CollisionCache;
use crate::stream::{LinkedRange, StreamArena, StreamId};

/// Ids of the streams every step context carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStreams {
    pub body_pairs: StreamId,
    pub manifolds: StreamId,
    pub fixed_jacobians: StreamId,
    pub moving_jacobians: StreamId,
    pub fixed_collision_events: StreamId,
    pub moving_collision_events: StreamId,
    pub fixed_trigger_events: StreamId,
    pub moving_trigger_events: StreamId,
}

/// Backend body id to engine body index
#[derive(Debug, Clone, Default)]
pub struct BodyIdTable {
    local: Vec<i32>,
}

impl BodyIdTable {
    pub fn clear(&mut self) {
        self.local.clear();
    }

    /// Map `backend_id` (masked) to `body_index`
    pub fn insert(&mut self, backend_id: u32, body_index: i32) {
        let slot = (backend_id & BODY_ID_MASK) as usize;
        if slot >= self.local.len() {
            self.local.resize(slot + 1, -1);
        }
        self.local[slot] = body_index;
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Engine index of a backend body id
    pub fn local(&self, backend_id: u32) -> PhysicsResult<i32> {
        let slot = (backend_id & BODY_ID_MASK) as usize;
        match self.local.get(slot) {
            Some(&index) if index >= 0 => Ok(index),
            _ => Err(PhysicsError::BodyIndexOutOfRange {
                index: backend_id as i64,
                count: self.local.len(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct StepContext {
    pub streams: StreamArena,
    pub ids: StepStreams,
    pub body_index_to_local: BodyIdTable,
    pub collision_caches: Vec<CollisionCache>,

    pub body_pairs: LinkedRange,
    pub manifolds: LinkedRange,
    pub fixed_jacobian_grid: Vec<LinkedRange>,
    pub moving_jacobian_grid: Vec<LinkedRange>,
    pub collision_events: Option<LinkedRange>,
    pub trigger_events: Option<LinkedRange>,

    step_index: u64,
    valid: bool,
}

impl StepContext {
    pub fn new() -> Self {
        let mut streams = StreamArena::new();
        let ids = StepStreams {
            body_pairs: streams.add("body pairs"),
            manifolds: streams.add("manifolds"),
            fixed_jacobians: streams.add("fixed jacobians"),
            moving_jacobians: streams.add("moving jacobians"),
            fixed_collision_events: streams.add("fixed collision events"),
            moving_collision_events: streams.add("moving collision events"),
            fixed_trigger_events: streams.add("fixed trigger events"),
            moving_trigger_events: streams.add("moving trigger events"),
        };
        Self {
            streams,
            body_pairs: LinkedRange::empty(ids.body_pairs),
            manifolds: LinkedRange::empty(ids.manifolds),
            ids,
            body_index_to_local: BodyIdTable::default(),
            collision_caches: Vec::new(),
            fixed_jacobian_grid: Vec::new(),
            moving_jacobian_grid: Vec::new(),
            collision_events: None,
            trigger_events: None,
            step_index: 0,
            valid: false,
        }
    }

    /// Drop everything the previous step produced
    pub fn begin_step(&mut self) {
        self.streams.reset_all();
        self.collision_caches.clear();
        self.body_pairs = LinkedRange::empty(self.ids.body_pairs);
        self.manifolds = LinkedRange::empty(self.ids.manifolds);
        self.fixed_jacobian_grid.clear();
        self.moving_jacobian_grid.clear();
        self.collision_events = None;
        self.trigger_events = None;
        self.step_index += 1;
        self.valid = true;
    }

    /// Mark the context unusable until the next step begins
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.collision_events = None;
        self.trigger_events = None;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn require_valid(&self, operation: &str) -> PhysicsResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(PhysicsError::MissingStepContext(format!(
                "{} needs a step in progress",
                operation
            )))
        }
    }
}

impl Default for StepContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache entry `index` of `caches`; a bad index means a corrupted record
pub(crate) fn cache_entry<'c>(
    caches: &'c mut [CollisionCache],
    index: u32,
    stream: &str,
) -> PhysicsResult<&'c mut CollisionCache> {
    let count = caches.len();
    caches.get_mut(index as usize).ok_or_else(|| {
        PhysicsError::corrupted(
            stream,
            format!("collision cache index {} out of {}", index, count),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::BodyIndexPair;

    #[test]
    fn test_body_id_table_masks_ids() {
        let mut table = BodyIdTable::default();
        table.insert(3, 0);
        table.insert(5 | (1 << 24), 7);

        assert_eq!(table.local(3).expect("id 3"), 0);
        assert_eq!(table.local(5).expect("id 5"), 7);
        assert_eq!(table.local(5 | (2 << 24)).expect("tagged id 5"), 7);
        assert!(matches!(table.local(4), Err(PhysicsError::BodyIndexOutOfRange { .. })));
        assert!(table.local(99).is_err());
    }

    #[test]
    fn test_begin_step_resets_streams() {
        let mut context = StepContext::new();
        assert!(context.require_valid("reader").is_err());

        context.begin_step();
        let id = context.ids.body_pairs;
        context
            .streams
            .get_mut(id)
            .expect("stream")
            .append(&BodyIndexPair::new(1, 2));
        context.collision_caches.push(CollisionCache::new(BodyIndexPair::new(1, 2)));
        assert_eq!(context.streams.total_records(), 1);

        context.begin_step();
        assert_eq!(context.streams.total_records(), 0);
        assert!(context.collision_caches.is_empty());
        assert_eq!(context.step_index(), 2);
        assert!(context.require_valid("reader").is_ok());

        context.invalidate();
        assert!(matches!(
            context.require_valid("reader"),
            Err(PhysicsError::MissingStepContext(_))
        ));
    }

    #[test]
    fn test_bad_cache_index_is_corruption() {
        let mut caches = vec![CollisionCache::new(BodyIndexPair::new(0, 1))];
        assert!(cache_entry(&mut caches, 0, "manifolds").is_ok());
        let err = cache_entry(&mut caches, 1, "manifolds").expect_err("out of range");
        assert!(err.is_fatal());
    }
}
