//! Block stream record store
//!
//! Phases hand variable-length records to each other through append-only
//! streams of fixed-capacity blocks. Blocks live in an arena and are
//! addressed by index; readers are plain `(block, offset, left_in_block,
//! left_total)` cursors.

pub mod block_stream;
pub mod linked_range;
pub mod reader;

pub use block_stream::{padded_size, BlockIndex, BlockStream, RecordLocation, StreamMark};
pub use linked_range::{LinkedRange, StreamArena, StreamId};
pub use reader::{BlockStreamCursorMut, BlockStreamReader, StreamCursor};
