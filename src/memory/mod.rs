//! Memory Module - per-world scratch storage reused across steps
//!
//! Nothing in here shrinks: buffers grow to the high-water mark of the
//! worlds they serve and are reused on every subsequent step.

pub mod memory_pool;
pub mod performance_metrics;
pub mod persistent_buffer;

pub use memory_pool::{BlockPool, BlockPoolStats};
pub use performance_metrics::{PhaseTiming, StepMetrics};
pub use persistent_buffer::PersistentBuffer;
