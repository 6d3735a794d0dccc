//! Events Module - collision and trigger events of the finished step
//!
//! [`CollisionEvents`] and [`TriggerEvents`] are `Copy` descriptors of a
//! linked range. Every call to `iter()` starts a fresh cursor at the head of
//! the range, so any number of consumers can walk the same step's events
//! independently. The content is rebuilt by the next step.

pub mod collision_events;
pub mod trigger_events;

pub use collision_events::{CollisionEvent, CollisionEventDetails, CollisionEvents, CollisionEventsIter};
pub use trigger_events::{TriggerEvent, TriggerEvents, TriggerEventsIter};

use crate::error::PhysicsResult;
use crate::stream::linked_range::Segments;
use crate::stream::{BlockStreamReader, LinkedRange, StreamArena};

/// Record cursor that follows every segment of a chained range
#[derive(Debug, Clone)]
pub(crate) struct RangeCursor<'a> {
    streams: &'a StreamArena,
    segments: Option<Segments<'a>>,
    reader: Option<BlockStreamReader<'a>>,
    failed: bool,
}

impl<'a> RangeCursor<'a> {
    pub(crate) fn new(streams: &'a StreamArena, range: Option<&'a LinkedRange>) -> Self {
        Self {
            streams,
            segments: range.map(LinkedRange::segments),
            reader: None,
            failed: false,
        }
    }

    /// Bytes of the next record; `record_size` tells how far to advance.
    /// The cursor stops for good after the first error.
    pub(crate) fn next_record<F>(&mut self, record_size: F) -> Option<PhysicsResult<&'a [u8]>>
    where
        F: Fn(&'a [u8]) -> PhysicsResult<usize>,
    {
        if self.failed {
            return None;
        }
        let result = self.try_next(record_size).transpose();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }

    fn try_next<F>(&mut self, record_size: F) -> PhysicsResult<Option<&'a [u8]>>
    where
        F: Fn(&'a [u8]) -> PhysicsResult<usize>,
    {
        loop {
            if let Some(reader) = self.reader.as_mut() {
                if reader.has_items() {
                    let bytes = reader.peek()?;
                    let size = record_size(bytes)?;
                    reader.advance(size)?;
                    return Ok(Some(bytes));
                }
            }
            let segment = match self.segments.as_mut().and_then(Iterator::next) {
                Some(segment) => segment,
                None => return Ok(None),
            };
            self.reader = Some(self.streams.reader(segment)?);
        }
    }
}
