//! Thread Pool Data - Pure DOP

/// How the pool for parallel step work is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepThreadPoolConfig {
    /// Worker count; 0 picks one per logical CPU
    pub thread_count_hint: usize,
    pub thread_name_prefix: String,
}

impl Default for StepThreadPoolConfig {
    fn default() -> Self {
        Self {
            thread_count_hint: 0,
            thread_name_prefix: "hearth-physics".to_string(),
        }
    }
}

/// A built pool plus the hint it was built for
#[derive(Debug)]
pub struct StepThreadPool {
    pub pool: rayon::ThreadPool,
    pub thread_count_hint: usize,
}
