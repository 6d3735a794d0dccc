//! Append-only block stream

use bytemuck::Pod;

use super::linked_range::{LinkedRange, StreamId};
use super::reader::{BlockStreamCursorMut, BlockStreamReader};
use crate::constants::stream::{BLOCK_BYTES, MAX_ELEMENTS_PER_BLOCK, RECORD_ALIGNMENT};
use crate::error::{PhysicsError, PhysicsResult};
use crate::memory::{BlockPool, BlockPoolStats};

/// Index of a block inside its stream's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(pub u32);

impl BlockIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Where an appended record starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub block: BlockIndex,
    pub byte_offset: u32,
}

/// Append position captured by [`BlockStream::mark`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMark {
    block: Option<BlockIndex>,
    byte_offset: usize,
    elements_in_block: u32,
    total: usize,
}

/// Size a record occupies once padded
pub fn padded_size(size: usize) -> usize {
    let padded = (size + RECORD_ALIGNMENT - 1) & !(RECORD_ALIGNMENT - 1);
    padded.max(RECORD_ALIGNMENT)
}

#[derive(Debug)]
struct Block {
    data: Vec<u32>,
    bytes_used: usize,
    num_elements: u32,
    next: Option<BlockIndex>,
}

impl Block {
    fn capacity_bytes(&self) -> usize {
        self.data.len() * 4
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.data)[..self.bytes_used]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let used = self.bytes_used;
        &mut bytemuck::cast_slice_mut(&mut self.data)[..used]
    }
}

/// Append-only sequence of records packed into linked blocks
#[derive(Debug)]
pub struct BlockStream {
    name: &'static str,
    blocks: Vec<Block>,
    num_elements: usize,
    pool: BlockPool,
}

impl BlockStream {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            blocks: Vec::new(),
            num_elements: 0,
            pool: BlockPool::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of records appended since the last reset
    pub fn len(&self) -> usize {
        self.num_elements
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn first_block(&self) -> Option<BlockIndex> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockIndex(0))
        }
    }

    pub fn pool_stats(&self) -> BlockPoolStats {
        self.pool.stats()
    }

    pub fn append<T: Pod>(&mut self, value: &T) -> RecordLocation {
        self.append_bytes(bytemuck::bytes_of(value))
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> RecordLocation {
        self.append_with(bytes.len(), |out| out.copy_from_slice(bytes))
    }

    /// Reserve `size` zeroed bytes and let `fill` write the record in place
    pub fn append_with<F>(&mut self, size: usize, fill: F) -> RecordLocation
    where
        F: FnOnce(&mut [u8]),
    {
        let padded = padded_size(size);
        let index = self.block_with_room(padded);
        let block = &mut self.blocks[index.as_usize()];

        let offset = block.bytes_used;
        block.bytes_used += padded;
        block.num_elements += 1;
        self.num_elements += 1;

        let record = &mut block.bytes_mut()[offset..offset + padded];
        record.fill(0);
        fill(&mut record[..size]);

        RecordLocation {
            block: index,
            byte_offset: offset as u32,
        }
    }

    fn block_with_room(&mut self, padded: usize) -> BlockIndex {
        if let Some(last) = self.blocks.last() {
            let room = last.capacity_bytes() - last.bytes_used;
            if room >= padded && last.num_elements < MAX_ELEMENTS_PER_BLOCK {
                return BlockIndex(self.blocks.len() as u32 - 1);
            }
        }

        let words = padded.max(BLOCK_BYTES) / 4;
        let data = self.pool.acquire(words);
        let index = BlockIndex(self.blocks.len() as u32);
        if let Some(last) = self.blocks.last_mut() {
            last.next = Some(index);
        }
        self.blocks.push(Block {
            data,
            bytes_used: 0,
            num_elements: 0,
            next: None,
        });
        index
    }

    /// Drop every record; block storage goes back to the pool
    pub fn reset(&mut self) {
        for block in self.blocks.drain(..) {
            self.pool.release(block.data);
        }
        self.num_elements = 0;
    }

    /// Capture the append position so later records can be exposed as a range
    pub fn mark(&self) -> StreamMark {
        match self.blocks.last() {
            Some(last) => StreamMark {
                block: Some(BlockIndex(self.blocks.len() as u32 - 1)),
                byte_offset: last.bytes_used,
                elements_in_block: last.num_elements,
                total: self.num_elements,
            },
            None => StreamMark {
                block: None,
                byte_offset: 0,
                elements_in_block: 0,
                total: 0,
            },
        }
    }

    /// Range covering every record appended after `mark`
    pub fn range_since(&self, id: StreamId, mark: &StreamMark) -> LinkedRange {
        let num_elements = self.num_elements.saturating_sub(mark.total);
        if num_elements == 0 {
            return LinkedRange::empty(id);
        }

        let start = match mark.block {
            Some(index) => match self.blocks.get(index.as_usize()) {
                Some(block) if block.num_elements > mark.elements_in_block => Some((
                    index,
                    mark.byte_offset,
                    block.num_elements - mark.elements_in_block,
                )),
                Some(block) => block
                    .next
                    .and_then(|next| self.blocks.get(next.as_usize()).map(|b| (next, 0, b.num_elements))),
                None => None,
            },
            None => self.blocks.first().map(|b| (BlockIndex(0), 0, b.num_elements)),
        };

        match start {
            Some((block, offset, in_block)) => LinkedRange {
                stream: id,
                block: Some(block),
                start_byte_offset: offset as u32,
                start_block_num_elements: in_block.min(num_elements as u32),
                num_elements: num_elements as u32,
                next: None,
            },
            None => LinkedRange::empty(id),
        }
    }

    /// Range over the whole stream
    pub fn full_range(&self, id: StreamId) -> LinkedRange {
        self.range_since(
            id,
            &StreamMark {
                block: None,
                byte_offset: 0,
                elements_in_block: 0,
                total: 0,
            },
        )
    }

    /// Bytes from `location` to the end of its block's used region
    pub fn record_bytes(&self, location: RecordLocation) -> PhysicsResult<&[u8]> {
        let bytes = self.block_bytes(location.block)?;
        bytes
            .get(location.byte_offset as usize..)
            .ok_or_else(|| PhysicsError::corrupted(self.name, "record offset past block end"))
    }

    pub fn record_bytes_mut(&mut self, location: RecordLocation) -> PhysicsResult<&mut [u8]> {
        let name = self.name;
        let bytes = self.block_bytes_mut(location.block)?;
        bytes
            .get_mut(location.byte_offset as usize..)
            .ok_or_else(|| PhysicsError::corrupted(name, "record offset past block end"))
    }

    pub fn reader(&self) -> BlockStreamReader<'_> {
        BlockStreamReader::new(self)
    }

    pub fn cursor_mut(&mut self) -> BlockStreamCursorMut<'_> {
        BlockStreamCursorMut::new(self)
    }

    pub(crate) fn block_bytes(&self, index: BlockIndex) -> PhysicsResult<&[u8]> {
        self.blocks
            .get(index.as_usize())
            .map(Block::bytes)
            .ok_or_else(|| PhysicsError::corrupted(self.name, "block index out of range"))
    }

    pub(crate) fn block_bytes_mut(&mut self, index: BlockIndex) -> PhysicsResult<&mut [u8]> {
        let name = self.name;
        self.blocks
            .get_mut(index.as_usize())
            .map(Block::bytes_mut)
            .ok_or_else(|| PhysicsError::corrupted(name, "block index out of range"))
    }

    /// Next block and its element count
    pub(crate) fn next_block(&self, index: BlockIndex) -> Option<(BlockIndex, u32)> {
        let next = self.blocks.get(index.as_usize())?.next?;
        let count = self.blocks.get(next.as_usize())?.num_elements;
        Some((next, count))
    }

    pub(crate) fn block_elements(&self, index: BlockIndex) -> u32 {
        self.blocks
            .get(index.as_usize())
            .map(|b| b.num_elements)
            .unwrap_or(0)
    }
}
