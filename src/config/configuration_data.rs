//! Configuration data structures - Pure DOP
//!
//! NO METHODS beyond defaults. All transformations happen in
//! configuration_operations.rs

use serde::{Deserialize, Serialize};

use crate::constants::{debugger, solver, world};

/// Axis-aligned region every simulated body must stay inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for WorldBounds {
    fn default() -> Self {
        let extent = world::DEFAULT_WORLD_EXTENT;
        Self {
            min: [-extent; 3],
            max: [extent; 3],
        }
    }
}

/// Out-of-band visualization stream settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualDebuggerConfiguration {
    pub enable: bool,
    pub port: u16,
    /// Size of the per-thread timer buffer. Frames larger than
    /// `timer_bytes_per_thread * threads` are trimmed to fit.
    pub timer_bytes_per_thread: usize,
}

impl Default for VisualDebuggerConfiguration {
    fn default() -> Self {
        Self {
            enable: false,
            port: debugger::DEFAULT_PORT,
            timer_bytes_per_thread: debugger::DEFAULT_TIMER_BYTES_PER_THREAD,
        }
    }
}

/// Tuning consumed by the reference backend's solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfiguration {
    /// Used when a step requests zero iterations
    pub default_iterations: u32,
    /// Speculative contact margin
    pub collision_tolerance: f32,
    /// Approach speed below which restitution is ignored
    pub contact_restitution_threshold: f32,
}

impl Default for SolverConfiguration {
    fn default() -> Self {
        Self {
            default_iterations: solver::DEFAULT_ITERATIONS,
            collision_tolerance: solver::DEFAULT_COLLISION_TOLERANCE,
            contact_restitution_threshold: solver::DEFAULT_RESTITUTION_THRESHOLD,
        }
    }
}

/// Per-world simulation configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfiguration {
    pub world_bounds: WorldBounds,
    pub enable_sleeping: bool,
    /// Contacts where either body carries one of these tag bits are welded
    pub body_tags_for_contact_welding: u8,
    pub visual_debugger: VisualDebuggerConfiguration,
    pub solver: SolverConfiguration,
}

impl Default for PhysicsConfiguration {
    fn default() -> Self {
        Self {
            world_bounds: WorldBounds::default(),
            enable_sleeping: true,
            body_tags_for_contact_welding: 0,
            visual_debugger: VisualDebuggerConfiguration::default(),
            solver: SolverConfiguration::default(),
        }
    }
}
