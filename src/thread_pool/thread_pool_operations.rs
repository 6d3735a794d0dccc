//! Thread Pool Operations - Pure functions for building step pools

use rayon::ThreadPoolBuilder;

use super::thread_pool_data::{StepThreadPool, StepThreadPoolConfig};
use crate::error::PhysicsResult;

/// Worker count a hint resolves to
pub fn resolve_thread_count(thread_count_hint: usize) -> usize {
    if thread_count_hint == 0 {
        num_cpus::get().max(1)
    } else {
        thread_count_hint
    }
}

pub fn create_step_thread_pool(config: &StepThreadPoolConfig) -> PhysicsResult<StepThreadPool> {
    let threads = resolve_thread_count(config.thread_count_hint);
    let prefix = config.thread_name_prefix.clone();
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |index| format!("{}-{}", prefix, index))
        .build()?;

    log::debug!(
        "[ThreadPool::create_step_thread_pool] {} workers (hint {})",
        threads,
        config.thread_count_hint
    );
    Ok(StepThreadPool {
        pool,
        thread_count_hint: config.thread_count_hint,
    })
}

/// Reuse `current` when it was built for the same hint, otherwise build a new pool
pub fn ensure_step_thread_pool(
    current: Option<StepThreadPool>,
    config: &StepThreadPoolConfig,
) -> PhysicsResult<StepThreadPool> {
    match current {
        Some(pool) if pool.thread_count_hint == config.thread_count_hint => Ok(pool),
        _ => create_step_thread_pool(config),
    }
}
