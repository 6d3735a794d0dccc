//! Step pipeline
//!
//! A step is a fixed schedule of backend phases. The state machine guards
//! the order, the task graph decides which tasks a world needs this tick,
//! and the simulation ties both to the backend, the callbacks and the
//! engine's buffers.

pub mod callbacks;
pub mod simulation;
pub mod step_context;
pub mod step_state;
pub mod task_graph;

pub use callbacks::{CallbackPhase, PhaseAccess, SimulationCallback, SimulationCallbacks};
pub use simulation::{flag_disabled_jacobians, Simulation, StepInput, StepReport};
pub use step_context::{BodyIdTable, StepContext, StepStreams};
pub use step_state::{StepState, StepStateMachine};
pub use task_graph::{StepTask, StepTaskGraph};
