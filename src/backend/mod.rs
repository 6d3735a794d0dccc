//! Backend Module - the stepping backend behind the pipeline
//!
//! The pipeline never looks inside a backend. It hands engine buffers in
//! through [`SteppingBackend::sync_world_in`], asks for one phase at a time
//! and reads motions back in batches. Everything the phases exchange lives
//! in the step context's streams, in the record layouts both sides agreed
//! on during [`negotiate`].

pub mod capability;
pub mod reference;

pub use capability::{negotiate, CapabilityToken, Entitlement};
pub use reference::ReferenceBackend;

use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use crate::body::{Joint, MotionData, MotionVelocity, RigidBody, StridedSlice};
use crate::camera::DebugCamera;
use crate::config::PhysicsConfiguration;
use crate::error::PhysicsResult;
use crate::pipeline::StepContext;
use crate::records::LayoutManifest;

/// Opaque id of a world allocated inside a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldHandle(pub u32);

/// Engine buffers handed to a backend at sync-in
#[derive(Debug, Clone, Copy)]
pub struct SyncInput<'a> {
    /// Dynamic bodies first, then static bodies
    pub bodies: StridedSlice<'a, RigidBody>,
    pub motion_datas: StridedSlice<'a, MotionData>,
    pub motion_velocities: StridedSlice<'a, MotionVelocity>,
    pub joints: StridedSlice<'a, Joint>,
    pub num_dynamic_bodies: usize,
    /// Static bodies are only copied when this is set
    pub synchronize_static_bodies: bool,
}

/// Per-step parameters handed over when a step starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParameters {
    pub time_step: f32,
    pub gravity: Vec3,
    pub solver_iterations: u32,
    pub thread_count: usize,
}

/// Phases a backend runs on request, in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendPhase {
    Broadphase,
    Narrowphase,
    SolverPrep,
    SolverSolve,
}

impl BackendPhase {
    pub fn name(self) -> &'static str {
        match self {
            BackendPhase::Broadphase => "broadphase",
            BackendPhase::Narrowphase => "narrowphase",
            BackendPhase::SolverPrep => "solver_prep",
            BackendPhase::SolverSolve => "solver_solve",
        }
    }
}

/// A physics engine the pipeline can drive
///
/// Phase outputs go into the step context:
///
/// - `Broadphase` fills `body_pairs` with [`BodyIndexPair`](crate::records::BodyIndexPair)s of backend body ids
/// - `Narrowphase` fills `manifolds` and `collision_caches`
/// - `SolverPrep` fills the fixed and moving Jacobian grids
/// - `SolverSolve` sets `collision_events` and `trigger_events`
///
/// `sync_world_in` fills `body_index_to_local`.
pub trait SteppingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Record layouts this backend reads and writes
    fn layout_manifest(&self) -> LayoutManifest;

    fn allocate_world(&mut self, config: &PhysicsConfiguration) -> PhysicsResult<WorldHandle>;

    fn destroy_world(&mut self, world: WorldHandle) -> PhysicsResult<()>;

    fn sync_world_in(
        &mut self,
        world: WorldHandle,
        input: &SyncInput<'_>,
        context: &mut StepContext,
    ) -> PhysicsResult<()>;

    /// Start a step: store the parameters and apply gravity
    fn step_world(&mut self, world: WorldHandle, parameters: &StepParameters) -> PhysicsResult<()>;

    fn process_phase(
        &mut self,
        world: WorldHandle,
        phase: BackendPhase,
        context: &mut StepContext,
    ) -> PhysicsResult<()>;

    /// Copy motions of dynamic bodies `start_index..start_index + len` out.
    /// Called concurrently for disjoint batches.
    fn sync_motions_out(
        &self,
        world: WorldHandle,
        start_index: usize,
        motion_datas: &mut [MotionData],
        motion_velocities: &mut [MotionVelocity],
    ) -> PhysicsResult<()>;

    fn step_visual_debugger(
        &mut self,
        world: WorldHandle,
        time_step: f32,
        camera: Option<&DebugCamera>,
    ) -> PhysicsResult<()>;

    /// Backend `key = value` configuration channel
    fn configure(&mut self, world: WorldHandle, key: &str, value: &str) -> PhysicsResult<()>;
}

/// Thread-safe backend: write lock for phases, read lock for extraction
pub type SharedBackend = Arc<RwLock<dyn SteppingBackend>>;

/// Wrap a backend for sharing between worlds
pub fn create_shared_backend<B: SteppingBackend + 'static>(backend: B) -> SharedBackend {
    Arc::new(RwLock::new(backend))
}
