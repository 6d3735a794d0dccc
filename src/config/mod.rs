/// Configuration Module - Data-Oriented Programming (DOP) style
///
/// - configuration_data.rs: plain configuration structures (serde)
/// - configuration_operations.rs: validation, loading and key/value overrides

pub mod configuration_data;
pub mod configuration_operations;

pub use configuration_data::{
    PhysicsConfiguration, SolverConfiguration, VisualDebuggerConfiguration, WorldBounds,
};
pub use configuration_operations::{apply_override, load_from_file, parse_toml, validate};
