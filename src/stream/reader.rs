//! Cursors over block streams

use bytemuck::Pod;

use super::block_stream::{padded_size, BlockIndex, BlockStream, RecordLocation};
use super::linked_range::LinkedRange;
use crate::error::{PhysicsError, PhysicsResult};

/// Read position inside a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    block: Option<BlockIndex>,
    byte_offset: usize,
    left_in_block: u32,
    left_total: usize,
    declared: usize,
}

impl StreamCursor {
    pub fn at_start(stream: &BlockStream) -> Self {
        let block = stream.first_block();
        Self {
            block,
            byte_offset: 0,
            left_in_block: block.map(|b| stream.block_elements(b)).unwrap_or(0),
            left_total: stream.len(),
            declared: stream.len(),
        }
    }

    /// Cursor over one segment of a linked range
    pub fn at_range(range: &LinkedRange) -> Self {
        Self {
            block: range.block,
            byte_offset: range.start_byte_offset as usize,
            left_in_block: range.start_block_num_elements,
            left_total: range.num_elements as usize,
            declared: range.num_elements as usize,
        }
    }

    pub fn has_items(&self) -> bool {
        self.left_total > 0
    }

    pub fn remaining(&self) -> usize {
        self.left_total
    }

    fn location(&self) -> PhysicsResult<RecordLocation> {
        match self.block {
            Some(block) if self.left_total > 0 => Ok(RecordLocation {
                block,
                byte_offset: self.byte_offset as u32,
            }),
            _ => Err(PhysicsError::StreamExhausted {
                declared: self.declared,
            }),
        }
    }

    /// Consume the current record of `bytes` bytes
    fn step(&mut self, stream: &BlockStream, bytes: usize) -> PhysicsResult<RecordLocation> {
        let location = self.location()?;
        let available = stream.block_bytes(location.block)?.len() - self.byte_offset;
        let padded = padded_size(bytes);
        if padded > available {
            return Err(PhysicsError::corrupted(
                stream.name(),
                format!("advance of {} bytes crosses block end ({} left)", padded, available),
            ));
        }

        self.byte_offset += padded;
        self.left_total -= 1;
        self.left_in_block = self.left_in_block.saturating_sub(1);

        if self.left_in_block == 0 && self.left_total > 0 {
            match stream.next_block(location.block) {
                Some((next, count)) => {
                    self.block = Some(next);
                    self.byte_offset = 0;
                    self.left_in_block = count;
                }
                None => {
                    return Err(PhysicsError::corrupted(
                        stream.name(),
                        format!("{} records declared past the last block", self.left_total),
                    ));
                }
            }
        }
        Ok(location)
    }
}

fn record_slice<'s>(stream: &'s BlockStream, cursor: &StreamCursor) -> PhysicsResult<&'s [u8]> {
    let location = cursor.location()?;
    stream.record_bytes(location)
}

fn cast_record<'s, T: Pod>(stream_name: &str, bytes: &'s [u8]) -> PhysicsResult<&'s T> {
    let size = std::mem::size_of::<T>();
    let head = bytes.get(..size).ok_or_else(|| {
        PhysicsError::corrupted(stream_name, format!("record needs {} bytes, {} left", size, bytes.len()))
    })?;
    bytemuck::try_from_bytes(head)
        .map_err(|e| PhysicsError::corrupted(stream_name, format!("cannot view record: {:?}", e)))
}

/// Sequential reader over an immutable stream
#[derive(Debug, Clone)]
pub struct BlockStreamReader<'a> {
    stream: &'a BlockStream,
    cursor: StreamCursor,
}

impl<'a> BlockStreamReader<'a> {
    pub fn new(stream: &'a BlockStream) -> Self {
        Self {
            stream,
            cursor: StreamCursor::at_start(stream),
        }
    }

    /// Reader over one segment of `range`; chained segments are not followed
    pub fn from_range(stream: &'a BlockStream, range: &LinkedRange) -> Self {
        Self {
            stream,
            cursor: StreamCursor::at_range(range),
        }
    }

    pub fn has_items(&self) -> bool {
        self.cursor.has_items()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Bytes of the current record through the end of its block
    pub fn peek(&self) -> PhysicsResult<&'a [u8]> {
        record_slice(self.stream, &self.cursor)
    }

    /// Typed view of the current record; the cursor moves past it
    pub fn read<T: Pod>(&mut self) -> PhysicsResult<&'a T> {
        let bytes = self.peek()?;
        let value = cast_record::<T>(self.stream.name(), bytes)?;
        self.cursor.step(self.stream, std::mem::size_of::<T>())?;
        Ok(value)
    }

    pub fn read_copy<T: Pod>(&mut self) -> PhysicsResult<T> {
        self.read::<T>().map(|value| *value)
    }

    /// Skip the current record, which occupies `bytes` bytes
    pub fn advance(&mut self, bytes: usize) -> PhysicsResult<()> {
        self.cursor.step(self.stream, bytes).map(|_| ())
    }
}

/// Sequential cursor over a mutable stream supporting in-place rewrites
#[derive(Debug)]
pub struct BlockStreamCursorMut<'a> {
    stream: &'a mut BlockStream,
    cursor: StreamCursor,
    last: Option<(RecordLocation, usize)>,
}

impl<'a> BlockStreamCursorMut<'a> {
    pub fn new(stream: &'a mut BlockStream) -> Self {
        let cursor = StreamCursor::at_start(stream);
        Self {
            stream,
            cursor,
            last: None,
        }
    }

    pub fn from_range(stream: &'a mut BlockStream, range: &LinkedRange) -> Self {
        Self {
            stream,
            cursor: StreamCursor::at_range(range),
            last: None,
        }
    }

    pub fn has_items(&self) -> bool {
        self.cursor.has_items()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn peek(&self) -> PhysicsResult<&[u8]> {
        record_slice(self.stream, &self.cursor)
    }

    pub fn peek_mut(&mut self) -> PhysicsResult<&mut [u8]> {
        let location = self.cursor.location()?;
        self.stream.record_bytes_mut(location)
    }

    pub fn read_copy<T: Pod>(&mut self) -> PhysicsResult<T> {
        let value = *cast_record::<T>(self.stream.name(), self.peek()?)?;
        self.advance(std::mem::size_of::<T>())?;
        Ok(value)
    }

    pub fn advance(&mut self, bytes: usize) -> PhysicsResult<()> {
        let location = self.cursor.step(self.stream, bytes)?;
        self.last = Some((location, padded_size(bytes)));
        Ok(())
    }

    /// The record most recently consumed by `read_copy` or `advance`
    pub fn last_record_mut(&mut self) -> PhysicsResult<&mut [u8]> {
        let (location, size) = self.last.ok_or_else(|| {
            PhysicsError::corrupted(self.stream.name(), "no record has been read yet")
        })?;
        let bytes = self.stream.record_bytes_mut(location)?;
        Ok(&mut bytes[..size])
    }

    /// Overwrite the most recently consumed record in place
    pub fn rewrite_last<T: Pod>(&mut self, value: &T) -> PhysicsResult<()> {
        let name = self.stream.name();
        let source = bytemuck::bytes_of(value);
        let record = self.last_record_mut()?;
        if source.len() > record.len() {
            log::error!(
                "[BlockStream::rewrite_last] {} byte value over {} byte record in '{}'",
                source.len(),
                record.len(),
                name
            );
            return Err(PhysicsError::RecordTooLarge {
                size: source.len(),
                available: record.len(),
            });
        }
        record[..source.len()].copy_from_slice(source);
        Ok(())
    }
}
