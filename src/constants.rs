//! Shared constants for the step pipeline

/// Block stream sizing
pub mod stream {
    /// Default payload capacity of one block in bytes
    pub const BLOCK_BYTES: usize = 4096;

    /// Every record is padded to this many bytes
    pub const RECORD_ALIGNMENT: usize = 16;

    /// Upper bound on records per block
    pub const MAX_ELEMENTS_PER_BLOCK: u32 = 0xffff;
}

/// Contact and manifold limits
pub mod contact {
    /// Maximum contact points in one manifold
    pub const MAX_CONTACT_POINTS: usize = 4;

    /// Jacobians written per grid entry before a new range is started
    pub const JACOBIANS_PER_GRID_ENTRY: usize = 64;
}

/// Body id encoding inside backend streams
pub mod body {
    /// Low bits of a backend body id hold the lookup index
    pub const BODY_ID_MASK: u32 = 0x00ff_ffff;

    /// Backend ids start at this value; id 0 is reserved for the backend's world body
    pub const FIRST_BODY_ID: u32 = 1;
}

/// Motion synchronization
pub mod sync {
    /// Dynamic bodies per parallel extraction batch
    pub const MOTION_EXTRACTION_BATCH_SIZE: usize = 128;
}

/// Visual debugger defaults
pub mod debugger {
    pub const DEFAULT_PORT: u16 = 25001;
    pub const DEFAULT_TIMER_BYTES_PER_THREAD: usize = 1024 * 1024;

    /// Frames buffered per subscriber before new frames are dropped
    pub const SUBSCRIBER_QUEUE_DEPTH: usize = 8;
}

/// World defaults
pub mod world {
    /// Half extent of the default world bounds on every axis
    pub const DEFAULT_WORLD_EXTENT: f32 = 5000.0;
}

/// Solver defaults and tuning
pub mod solver {
    pub const DEFAULT_ITERATIONS: u32 = 4;
    pub const DEFAULT_COLLISION_TOLERANCE: f32 = 0.1;
    pub const DEFAULT_RESTITUTION_THRESHOLD: f32 = 1.0;

    /// Fraction of penetration recovered per step
    pub const PENETRATION_RECOVERY: f32 = 0.2;

    /// Linear and angular speed below which a body counts as resting
    pub const SLEEP_LINEAR_THRESHOLD: f32 = 0.05;
    pub const SLEEP_ANGULAR_THRESHOLD: f32 = 0.05;

    /// Consecutive resting frames before a body falls asleep
    pub const SLEEP_FRAMES: u32 = 30;
}
