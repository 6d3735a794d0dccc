//! Unified error handling for Hearth Physics
//!
//! Every fallible operation in the step pipeline returns [`PhysicsResult`].
//! Errors fall into two classes: fatal ones that abort initialization or the
//! current step (layout mismatches, stream misuse, corrupted records,
//! illegal state transitions) and recoverable ones the caller may handle.

use thiserror::Error;

use crate::pipeline::StepState;

/// Main error type for Hearth Physics
#[derive(Debug, Error)]
pub enum PhysicsError {
    // Boundary errors
    #[error("Record layout incompatible for {record}: {detail}")]
    IncompatibleLayout { record: String, detail: String },

    #[error("Capability fingerprint mismatch: expected {expected:#010x}, found {found:#010x}")]
    CapabilityMismatch { expected: u64, found: u64 },

    // Record store errors
    #[error("Stream exhausted: read past {declared} declared elements")]
    StreamExhausted { declared: usize },

    #[error("Corrupted record in {stream}: {reason}")]
    CorruptedRecord { stream: String, reason: String },

    #[error("Record of {size} bytes does not fit in {available} bytes")]
    RecordTooLarge { size: usize, available: usize },

    // Pipeline errors
    #[error("Invalid step transition: {from:?} -> {to:?}")]
    InvalidTransition { from: StepState, to: StepState },

    #[error("A step is already in flight for world {world}")]
    StepInFlight { world: u32 },

    #[error("Missing step context: {0}")]
    MissingStepContext(String),

    #[error("Phase mismatch: {operation} requires {expected}, current boundary is {actual}")]
    PhaseMismatch {
        operation: String,
        expected: String,
        actual: String,
    },

    #[error("Callback failed during {phase}: {error}")]
    CallbackFailed { phase: String, error: String },

    // Input errors
    #[error("Invalid stride for {name}: stride {stride} < element size {element_size}")]
    InvalidStride {
        name: String,
        stride: usize,
        element_size: usize,
    },

    #[error("Buffer too small for {name}: need {required} bytes, have {available}")]
    BufferTooSmall {
        name: String,
        required: usize,
        available: usize,
    },

    #[error("Body index {index} out of range (body count {count})")]
    BodyIndexOutOfRange { index: i64, count: usize },

    #[error("World not found: {0}")]
    WorldNotFound(u32),

    // Backend errors
    #[error("Backend error during {operation}: {error}")]
    BackendError { operation: String, error: String },

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    // Configuration errors
    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Serialization error in {context}: {error}")]
    SerializationError { context: String, error: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PhysicsError {
    /// True for errors that must abort initialization or the current step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PhysicsError::IncompatibleLayout { .. }
                | PhysicsError::CapabilityMismatch { .. }
                | PhysicsError::StreamExhausted { .. }
                | PhysicsError::CorruptedRecord { .. }
                | PhysicsError::InvalidTransition { .. }
                | PhysicsError::MissingStepContext(_)
        )
    }

    pub(crate) fn corrupted(stream: &str, reason: impl Into<String>) -> Self {
        PhysicsError::CorruptedRecord {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(operation: &str, error: impl ToString) -> Self {
        PhysicsError::BackendError {
            operation: operation.to_string(),
            error: error.to_string(),
        }
    }
}

/// Type alias for Results in Hearth Physics
pub type PhysicsResult<T> = Result<T, PhysicsError>;

impl From<bincode::Error> for PhysicsError {
    fn from(error: bincode::Error) -> Self {
        PhysicsError::SerializationError {
            context: "bincode".to_string(),
            error: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for PhysicsError {
    fn from(error: serde_json::Error) -> Self {
        PhysicsError::SerializationError {
            context: "json".to_string(),
            error: error.to_string(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for PhysicsError {
    fn from(error: rayon::ThreadPoolBuildError) -> Self {
        PhysicsError::Internal {
            message: format!("Thread pool build failed: {}", error),
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_physics<F>(self, f: F) -> PhysicsResult<T>
    where
        F: FnOnce() -> PhysicsError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_physics<F>(self, f: F) -> PhysicsResult<T>
    where
        F: FnOnce() -> PhysicsError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> PhysicsResult<T>;
    fn with_context<F>(self, f: F) -> PhysicsResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> PhysicsResult<T> {
        self.map_err(|e| PhysicsError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> PhysicsResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PhysicsError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
