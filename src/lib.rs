// Hearth Physics - binding layer between the engine's rigid bodies and a
// stepping backend
//
// Engine data stays in plain buffers (`body`), phases exchange records
// through block streams (`stream`, `records`), and the step pipeline drives
// one world at a time through a backend (`pipeline`, `backend`).
// - Modifier jobs rewrite pairs, contacts and Jacobians between phases
// - Event readers walk the solver's collision and trigger streams

// Constants module
pub mod constants;

// Core
pub mod error;
pub mod config;
pub mod memory;

// Records and streams
pub mod stream;
pub mod records;

// Engine-side data
pub mod body;
pub mod camera;

// Step pipeline
pub mod backend;
pub mod events;
pub mod modify;
pub mod pipeline;
pub mod thread_pool;
pub mod world;

pub use backend::{
    create_shared_backend, negotiate, CapabilityToken, Entitlement, ReferenceBackend, SharedBackend,
    SteppingBackend, WorldHandle,
};
pub use body::{
    CollisionResponse, Entity, Joint, MotionData, MotionVelocity, PhysicsWorld, RigidBody, StridedSlice,
    Velocity,
};
pub use camera::{CameraData, DebugCamera};
pub use config::PhysicsConfiguration;
pub use error::{ErrorContext, OptionExt, PhysicsError, PhysicsResult};
pub use events::{CollisionEvent, CollisionEvents, TriggerEvent, TriggerEvents};
pub use modify::{
    BodyPairsJob, ContactsJob, JacobiansJob, ModifiableBodyPair, ModifiableContactHeader,
    ModifiableContactPoint,
};
pub use pipeline::{
    CallbackPhase, PhaseAccess, Simulation, SimulationCallbacks, StepInput, StepReport, StepState,
};
pub use records::{BodyIndexPair, JacobianFlags};
pub use world::{WorldId, WorldManager};
