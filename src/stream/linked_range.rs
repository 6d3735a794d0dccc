//! Linked ranges and the stream arena that owns their blocks

use super::block_stream::{BlockIndex, BlockStream};
use super::reader::{BlockStreamCursorMut, BlockStreamReader};
use crate::error::{PhysicsError, PhysicsResult};

/// Index of a stream inside a [`StreamArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u16);

/// Non-owning view of a run of records, optionally chained to further runs
/// that may live in other streams.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedRange {
    pub stream: StreamId,
    pub block: Option<BlockIndex>,
    pub start_byte_offset: u32,
    /// Records of this segment inside the start block
    pub start_block_num_elements: u32,
    /// Records of this segment in total
    pub num_elements: u32,
    pub next: Option<Box<LinkedRange>>,
}

impl LinkedRange {
    pub fn empty(stream: StreamId) -> Self {
        Self {
            stream,
            block: None,
            start_byte_offset: 0,
            start_block_num_elements: 0,
            num_elements: 0,
            next: None,
        }
    }

    /// True when no segment of the chain holds a record
    pub fn is_empty(&self) -> bool {
        self.total_elements() == 0
    }

    pub fn total_elements(&self) -> usize {
        self.segments().map(|s| s.num_elements as usize).sum()
    }

    pub fn segments(&self) -> Segments<'_> {
        Segments {
            current: Some(self),
        }
    }

    /// Attach `tail` after the last segment of this chain
    pub fn chain(&mut self, tail: LinkedRange) {
        match self.next {
            Some(ref mut next) => next.chain(tail),
            None => self.next = Some(Box::new(tail)),
        }
    }
}

/// Iterator over the segments of a chained range
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    current: Option<&'a LinkedRange>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a LinkedRange;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.current?;
        self.current = segment.next.as_deref();
        Some(segment)
    }
}

/// Streams owned by one step context
#[derive(Debug, Default)]
pub struct StreamArena {
    streams: Vec<BlockStream>,
}

impl StreamArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str) -> StreamId {
        self.streams.push(BlockStream::new(name));
        StreamId(self.streams.len() as u16 - 1)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn get(&self, id: StreamId) -> PhysicsResult<&BlockStream> {
        self.streams
            .get(id.0 as usize)
            .ok_or_else(|| PhysicsError::MissingStepContext(format!("stream {}", id.0)))
    }

    pub fn get_mut(&mut self, id: StreamId) -> PhysicsResult<&mut BlockStream> {
        self.streams
            .get_mut(id.0 as usize)
            .ok_or_else(|| PhysicsError::MissingStepContext(format!("stream {}", id.0)))
    }

    /// Reader over one segment
    pub fn reader(&self, segment: &LinkedRange) -> PhysicsResult<BlockStreamReader<'_>> {
        Ok(BlockStreamReader::from_range(self.get(segment.stream)?, segment))
    }

    pub fn cursor_mut(&mut self, segment: &LinkedRange) -> PhysicsResult<BlockStreamCursorMut<'_>> {
        Ok(BlockStreamCursorMut::from_range(self.get_mut(segment.stream)?, segment))
    }

    pub fn reset_all(&mut self) {
        for stream in &mut self.streams {
            stream.reset();
        }
    }

    pub fn total_records(&self) -> usize {
        self.streams.iter().map(BlockStream::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_spans_streams() {
        let mut arena = StreamArena::new();
        let fixed = arena.add("fixed events");
        let moving = arena.add("moving events");

        for i in 0..3u32 {
            arena.get_mut(fixed).expect("stream").append(&[i, 0u32]);
        }
        for i in 3..5u32 {
            arena.get_mut(moving).expect("stream").append(&[i, 0u32]);
        }

        let mut range = arena.get(fixed).expect("stream").full_range(fixed);
        range.chain(arena.get(moving).expect("stream").full_range(moving));
        range.chain(LinkedRange::empty(moving));

        assert_eq!(range.segments().count(), 3);
        assert_eq!(range.total_elements(), 5);

        let mut values = Vec::new();
        for segment in range.segments() {
            let mut reader = arena.reader(segment).expect("reader");
            while reader.has_items() {
                values.push(reader.read::<[u32; 2]>().expect("read")[0]);
            }
        }
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_stream_is_missing_context() {
        let arena = StreamArena::new();
        assert!(matches!(
            arena.get(StreamId(4)),
            Err(PhysicsError::MissingStepContext(_))
        ));
    }
}
