/// Thread Pool Module - rayon pools for the parallel parts of a step
///
/// - thread_pool_data.rs: configuration and the built pool
/// - thread_pool_operations.rs: building and reusing pools

pub mod thread_pool_data;
pub mod thread_pool_operations;

pub use thread_pool_data::{StepThreadPool, StepThreadPoolConfig};
pub use thread_pool_operations::{create_step_thread_pool, ensure_step_thread_pool, resolve_thread_count};
