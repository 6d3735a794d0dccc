//! Simulation - drives one world through a step
//!
//! Each step rebuilds the task graph for the world's shape, walks it in
//! dependency order and moves the state machine along with it. Callbacks
//! run right after the phase whose output they modify. Any failure aborts
//! the step: the state machine drops back to Idle and the step context is
//! invalidated, so event readers see an empty step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec3;
use rayon::prelude::*;

use super::callbacks::{CallbackPhase, PhaseAccess, SimulationCallbacks};
use super::step_context::{cache_entry, StepContext};
use super::step_state::{StepState, StepStateMachine};
use super::task_graph::{StepTask, StepTaskGraph};
use crate::backend::{
    BackendPhase, CapabilityToken, SharedBackend, StepParameters, SyncInput, WorldHandle,
};
use crate::body::{MotionData, MotionVelocity, PhysicsWorld, StridedSlice, Velocity};
use crate::camera::DebugCamera;
use crate::config::{validate, PhysicsConfiguration};
use crate::constants::sync::MOTION_EXTRACTION_BATCH_SIZE;
use crate::error::{PhysicsError, PhysicsResult};
use crate::events::{CollisionEvents, TriggerEvents};
use crate::memory::{PersistentBuffer, PhaseTiming, StepMetrics};
use crate::records::{JacobianFlags, JacobianHeaderFlags, JacobianRecordMut, ManifoldType};
use crate::stream::LinkedRange;
use crate::thread_pool::{ensure_step_thread_pool, StepThreadPool, StepThreadPoolConfig};

/// Per-step input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInput {
    pub time_step: f32,
    pub gravity: Vec3,
    /// 0 uses the configured default
    pub solver_iterations: u32,
    /// Worker threads for parallel sub-tasks; 0 picks one per CPU
    pub thread_count_hint: usize,
    /// Copy integrated transforms back onto the engine's bodies
    pub synchronize_collision_world: bool,
}

impl Default for StepInput {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            solver_iterations: 0,
            thread_count_hint: 0,
            synchronize_collision_world: true,
        }
    }
}

/// What one step did
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub step_index: u64,
    /// Tasks in the order they ran
    pub executed: Vec<StepTask>,
    pub states: Vec<StepState>,
    pub schedule_digest: u32,
    pub timings: Vec<PhaseTiming>,
    pub num_body_pairs: usize,
    pub num_manifolds: usize,
    pub num_jacobians: usize,
    pub num_collision_events: usize,
    pub num_trigger_events: usize,
    pub callbacks_run: usize,
    /// Whether static bodies were synchronized
    pub static_bodies_synchronized: bool,
    /// Set when the step did nothing because the capability token is not entitled
    pub skipped: bool,
}

/// Mark Jacobians of disabled contacts so the solver skips them. Returns
/// the number of records newly flagged.
pub fn flag_disabled_jacobians(context: &mut StepContext) -> PhysicsResult<usize> {
    context.require_valid("flag_disabled_jacobians")?;
    let StepContext {
        streams,
        collision_caches,
        fixed_jacobian_grid,
        moving_jacobian_grid,
        ..
    } = context;

    let mut flagged = 0;
    for grid in [&*fixed_jacobian_grid, &*moving_jacobian_grid] {
        for segment in grid.iter().flat_map(LinkedRange::segments) {
            let mut cursor = streams.cursor_mut(segment)?;
            while cursor.has_items() {
                let size = {
                    let mut record = JacobianRecordMut::parse(cursor.peek_mut()?)?;
                    let header = record.header_mut()?;
                    let cache = cache_entry(collision_caches, header.cache_index, "jacobians")?;
                    let mut header_flags = header.header_flags();
                    if cache.jacobian_flags().contains(JacobianFlags::DISABLED)
                        && !header_flags.contains(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL)
                    {
                        header_flags.insert(JacobianHeaderFlags::MANIFOLD_IS_NOT_NORMAL);
                        header.set_header_flags(header_flags);
                        header.manifold_type = ManifoldType::Disabled as u8;
                        flagged += 1;
                    }
                    record.layout().total_size
                };
                cursor.advance(size)?;
            }
        }
    }
    Ok(flagged)
}

/// One world in a backend plus everything needed to step it
pub struct Simulation {
    backend: SharedBackend,
    handle: WorldHandle,
    config: PhysicsConfiguration,
    token: CapabilityToken,
    context: StepContext,
    input_velocities: PersistentBuffer<Velocity>,
    motion_scratch: PersistentBuffer<MotionData>,
    velocity_scratch: PersistentBuffer<MotionVelocity>,
    state: StepStateMachine,
    static_bodies_changed: Arc<AtomicBool>,
    static_synced_once: bool,
    /// (dynamic, static) body counts at the last sync
    last_body_counts: (usize, usize),
    metrics: StepMetrics,
    thread_pool: Option<StepThreadPool>,
    debug_camera: Option<DebugCamera>,
    time_step: f32,
    denial_logged: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("handle", &self.handle)
            .field("state", &self.state.state())
            .field("step_index", &self.context.step_index())
            .finish()
    }
}

impl Simulation {
    /// Allocate a world in `backend`. The token must come from negotiating
    /// with the same backend.
    pub fn new(
        backend: SharedBackend,
        token: CapabilityToken,
        config: PhysicsConfiguration,
    ) -> PhysicsResult<Self> {
        validate(&config).map_err(|error| PhysicsError::InvalidConfig {
            field: "configuration".to_string(),
            value: String::new(),
            reason: error.to_string(),
        })?;

        let handle = {
            let mut guard = backend.write();
            let found = guard.layout_manifest().fingerprint();
            if guard.name() != token.backend_name() || found != token.fingerprint() {
                return Err(PhysicsError::CapabilityMismatch {
                    expected: token.fingerprint(),
                    found,
                });
            }
            guard.allocate_world(&config)?
        };
        log::info!(
            "[Simulation::new] World {} created on backend '{}'",
            handle.0,
            token.backend_name()
        );

        Ok(Self {
            backend,
            handle,
            config,
            token,
            context: StepContext::new(),
            input_velocities: PersistentBuffer::new(),
            motion_scratch: PersistentBuffer::new(),
            velocity_scratch: PersistentBuffer::new(),
            state: StepStateMachine::new(handle.0),
            static_bodies_changed: Arc::new(AtomicBool::new(false)),
            static_synced_once: false,
            last_body_counts: (0, 0),
            metrics: StepMetrics::new(),
            thread_pool: None,
            debug_camera: None,
            time_step: 0.0,
            denial_logged: false,
        })
    }

    pub fn handle(&self) -> WorldHandle {
        self.handle
    }

    pub fn config(&self) -> &PhysicsConfiguration {
        &self.config
    }

    pub fn capability(&self) -> &CapabilityToken {
        &self.token
    }

    pub fn state(&self) -> StepState {
        self.state.state()
    }

    pub fn context(&self) -> &StepContext {
        &self.context
    }

    /// Input velocities of the last step, gravity included
    pub fn input_velocities(&self) -> &[Velocity] {
        self.input_velocities.as_slice()
    }

    /// Shared with the engine; set it whenever static bodies move or change
    pub fn static_bodies_changed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.static_bodies_changed)
    }

    pub fn mark_static_bodies_changed(&self) {
        self.static_bodies_changed.store(true, Ordering::Release);
    }

    /// Viewer position handed to the visual debugger
    pub fn set_debug_camera(&mut self, camera: Option<DebugCamera>) {
        self.debug_camera = camera;
    }

    /// Apply a configuration override here and in the backend
    pub fn configure(&mut self, key: &str, value: &str) -> PhysicsResult<()> {
        let mut config = self.config;
        crate::config::apply_override(&mut config, key, value)?;
        self.backend.write().configure(self.handle, key, value)?;
        self.config = config;
        log::info!("[Simulation::configure] World {}: {} = {}", self.handle.0, key, value);
        Ok(())
    }

    /// Collision events of the last step
    pub fn collision_events<'a>(&'a self, world: &'a PhysicsWorld) -> CollisionEvents<'a> {
        CollisionEvents::new(&self.context, world, self.input_velocities.as_slice(), self.time_step)
    }

    /// Trigger events of the last step
    pub fn trigger_events<'a>(&'a self, world: &'a PhysicsWorld) -> TriggerEvents<'a> {
        TriggerEvents::new(&self.context, world)
    }

    pub fn step(&mut self, world: &mut PhysicsWorld, input: &StepInput) -> PhysicsResult<StepReport> {
        let mut callbacks = SimulationCallbacks::new();
        self.step_with_callbacks(world, input, &mut callbacks)
    }

    pub fn step_with_callbacks(
        &mut self,
        world: &mut PhysicsWorld,
        input: &StepInput,
        callbacks: &mut SimulationCallbacks,
    ) -> PhysicsResult<StepReport> {
        if !self.token.is_entitled() {
            if !self.denial_logged {
                log::warn!(
                    "[Simulation::step] World {}: backend not entitled ({:?}), steps do nothing",
                    self.handle.0,
                    self.token.entitlement()
                );
                self.denial_logged = true;
            }
            self.context.invalidate();
            return Ok(StepReport {
                skipped: true,
                ..StepReport::default()
            });
        }

        self.state.begin()?;
        self.context.begin_step();
        self.metrics.clear();
        self.time_step = input.time_step;

        match self.run_step(world, input, callbacks) {
            Ok(report) => Ok(report),
            Err(error) => {
                self.state.abort();
                self.context.invalidate();
                self.metrics.clear();
                log::error!(
                    "[Simulation::step] World {} step {} aborted: {}",
                    self.handle.0,
                    self.context.step_index(),
                    error
                );
                Err(error)
            }
        }
    }

    fn run_step(
        &mut self,
        world: &mut PhysicsWorld,
        input: &StepInput,
        callbacks: &mut SimulationCallbacks,
    ) -> PhysicsResult<StepReport> {
        let graph = StepTaskGraph::for_step(
            world.num_dynamic_bodies() > 0,
            self.config.visual_debugger.enable,
        )?;
        let pool_config = StepThreadPoolConfig {
            thread_count_hint: input.thread_count_hint,
            ..StepThreadPoolConfig::default()
        };
        self.thread_pool = Some(ensure_step_thread_pool(self.thread_pool.take(), &pool_config)?);

        let mut report = StepReport {
            step_index: self.context.step_index(),
            ..StepReport::default()
        };
        for &task in graph.execution_order() {
            let _span = tracing::trace_span!("physics_task", task = task.name(), world = self.handle.0).entered();
            self.metrics.start_measurement(task.name());
            self.run_task(task, world, input, callbacks, &mut report)?;
            report.executed.push(task);
        }
        self.metrics.end_measurement();
        self.state.advance(StepState::Idle)?;

        report.states = self.state.history().to_vec();
        report.schedule_digest = self.state.schedule_digest();
        report.timings = self.metrics.take_timings();
        log::debug!(
            "[Simulation::step] World {} step {}: {} pairs, {} manifolds, {} jacobians, {} collision / {} trigger events",
            self.handle.0,
            report.step_index,
            report.num_body_pairs,
            report.num_manifolds,
            report.num_jacobians,
            report.num_collision_events,
            report.num_trigger_events
        );
        Ok(report)
    }

    fn run_task(
        &mut self,
        task: StepTask,
        world: &mut PhysicsWorld,
        input: &StepInput,
        callbacks: &mut SimulationCallbacks,
        report: &mut StepReport,
    ) -> PhysicsResult<()> {
        match task {
            StepTask::SyncIn => {
                report.static_bodies_synchronized = self.sync_in(world)?;
            }
            StepTask::CopyInputVelocities => self.copy_input_velocities(world, input),
            StepTask::StartStep => {
                let solver_iterations = match input.solver_iterations {
                    0 => self.config.solver.default_iterations,
                    n => n,
                };
                let thread_count = self
                    .thread_pool
                    .as_ref()
                    .map(|pool| pool.pool.current_num_threads())
                    .unwrap_or(1);
                let parameters = StepParameters {
                    time_step: input.time_step,
                    gravity: input.gravity,
                    solver_iterations,
                    thread_count,
                };
                self.backend.write().step_world(self.handle, &parameters)?;
            }
            StepTask::Broadphase => {
                self.run_phase(StepState::Broadphase, BackendPhase::Broadphase)?;
                report.num_body_pairs = self.context.body_pairs.total_elements();
                report.callbacks_run +=
                    self.run_callbacks(CallbackPhase::PostCreateDispatchPairs, world, callbacks)?;
            }
            StepTask::Narrowphase => {
                self.run_phase(StepState::Narrowphase, BackendPhase::Narrowphase)?;
                report.num_manifolds = self.context.collision_caches.len();
                report.callbacks_run +=
                    self.run_callbacks(CallbackPhase::PostCreateContacts, world, callbacks)?;
            }
            StepTask::SolverPrep => {
                self.run_phase(StepState::SolverPrep, BackendPhase::SolverPrep)?;
                report.num_jacobians = self
                    .context
                    .fixed_jacobian_grid
                    .iter()
                    .chain(&self.context.moving_jacobian_grid)
                    .map(LinkedRange::total_elements)
                    .sum();
                report.callbacks_run +=
                    self.run_callbacks(CallbackPhase::PostCreateContactJacobians, world, callbacks)?;
            }
            StepTask::SolverSolve => {
                let flagged = flag_disabled_jacobians(&mut self.context)?;
                if flagged > 0 {
                    log::trace!("[Simulation::step] {} disabled jacobians flagged", flagged);
                }
                self.run_phase(StepState::SolverSolve, BackendPhase::SolverSolve)?;
                report.num_collision_events = self.collision_events(world).len();
                report.num_trigger_events = self.trigger_events(world).len();
            }
            StepTask::VisualDebugger => {
                self.state.advance(StepState::VisualDebuggerStep)?;
                self.backend
                    .write()
                    .step_visual_debugger(self.handle, input.time_step, self.debug_camera.as_ref())?;
            }
            StepTask::ExtractMotions => {
                report.callbacks_run +=
                    self.run_callbacks(CallbackPhase::PostSolveJacobians, world, callbacks)?;
                self.state.advance(StepState::SyncOut)?;
                self.extract_motions(world)?;
                if input.synchronize_collision_world {
                    world.sync_bodies_from_motions();
                }
            }
        }
        Ok(())
    }

    /// Returns whether static bodies were synchronized
    fn sync_in(&mut self, world: &PhysicsWorld) -> PhysicsResult<bool> {
        world.validate()?;
        let changed = self.static_bodies_changed.swap(false, Ordering::AcqRel);
        let counts = (world.num_dynamic_bodies(), world.num_static_bodies());
        let synchronize_static = changed || !self.static_synced_once || counts != self.last_body_counts;

        let input = SyncInput {
            bodies: StridedSlice::from_slice(&world.bodies),
            motion_datas: StridedSlice::from_slice(&world.motion_datas),
            motion_velocities: StridedSlice::from_slice(&world.motion_velocities),
            joints: StridedSlice::from_slice(&world.joints),
            num_dynamic_bodies: world.num_dynamic_bodies(),
            synchronize_static_bodies: synchronize_static,
        };
        let result = self
            .backend
            .write()
            .sync_world_in(self.handle, &input, &mut self.context);
        if let Err(error) = result {
            if changed {
                self.static_bodies_changed.store(true, Ordering::Release);
            }
            return Err(error);
        }

        self.static_synced_once = true;
        self.last_body_counts = counts;
        if world.num_dynamic_bodies() == 0 {
            self.input_velocities.ensure_len(0);
        }
        Ok(synchronize_static)
    }

    fn copy_input_velocities(&mut self, world: &PhysicsWorld, input: &StepInput) {
        let gravity_step = input.gravity * input.time_step;
        let count = world.num_dynamic_bodies();
        let snapshot = self.input_velocities.ensure_len(count);
        for ((slot, velocity), motion) in snapshot
            .iter_mut()
            .zip(&world.motion_velocities)
            .zip(&world.motion_datas)
        {
            let linear = Vec3::from_array(velocity.linear) + gravity_step * motion.gravity_factor;
            *slot = Velocity {
                linear: linear.to_array(),
                angular: velocity.angular,
            };
        }
    }

    fn run_phase(&mut self, state: StepState, phase: BackendPhase) -> PhysicsResult<()> {
        self.state.advance(state)?;
        self.backend
            .write()
            .process_phase(self.handle, phase, &mut self.context)
    }

    fn run_callbacks(
        &mut self,
        phase: CallbackPhase,
        world: &PhysicsWorld,
        callbacks: &mut SimulationCallbacks,
    ) -> PhysicsResult<usize> {
        if !callbacks.any(phase) {
            return Ok(0);
        }
        let mut access = PhaseAccess::new(
            phase,
            &mut self.context,
            world,
            self.input_velocities.as_slice(),
            self.time_step,
        );
        callbacks.run(&mut access)
    }

    /// Copy motions out of the backend in parallel batches. Batches land in
    /// scratch buffers; the engine's arrays change only once all succeed.
    fn extract_motions(&mut self, world: &mut PhysicsWorld) -> PhysicsResult<()> {
        let count = world.num_dynamic_bodies();
        let handle = self.handle;
        let pool = self.thread_pool.as_ref().ok_or_else(|| PhysicsError::Internal {
            message: "thread pool missing at motion extraction".to_string(),
        })?;
        let guard = self.backend.read();
        let backend = &*guard;

        let datas = self.motion_scratch.ensure_len(count);
        let velocities = self.velocity_scratch.ensure_len(count);
        pool.pool.install(|| {
            datas
                .par_chunks_mut(MOTION_EXTRACTION_BATCH_SIZE)
                .zip(velocities.par_chunks_mut(MOTION_EXTRACTION_BATCH_SIZE))
                .enumerate()
                .try_for_each(|(batch, (datas, velocities))| {
                    backend.sync_motions_out(handle, batch * MOTION_EXTRACTION_BATCH_SIZE, datas, velocities)
                })
        })?;

        world.motion_datas.copy_from_slice(self.motion_scratch.as_slice());
        world.motion_velocities.copy_from_slice(self.velocity_scratch.as_slice());
        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        match self.backend.write().destroy_world(self.handle) {
            Ok(()) => log::debug!("[Simulation::drop] World {} released", self.handle.0),
            Err(error) => log::warn!("[Simulation::drop] World {}: {}", self.handle.0, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{create_shared_backend, negotiate, Entitlement, ReferenceBackend, SteppingBackend};
    use crate::body::{CollisionResponse, Entity, MotionData, MotionVelocity, RigidBody};
    use crate::modify::{ModifiableContactHeader, ModifiableContactPoint};
    use crate::records::LayoutManifest;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn simulation(entitlement: Entitlement, config: PhysicsConfiguration) -> Simulation {
        init_logging();
        let backend = create_shared_backend(ReferenceBackend::new());
        let token = negotiate(&*backend.read(), entitlement).expect("negotiate");
        Simulation::new(backend, token, config).expect("simulation")
    }

    fn input() -> StepInput {
        StepInput {
            thread_count_hint: 2,
            ..StepInput::default()
        }
    }

    /// A dynamic sphere dropping onto a static one
    fn falling_world(response: CollisionResponse) -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        world.add_static_body(RigidBody::sphere(Entity::new(10, 1), Vec3::ZERO, 0.5));
        world.add_dynamic_body(
            RigidBody::sphere(Entity::new(11, 1), Vec3::new(0.0, 1.02, 0.0), 0.5).with_response(response),
            MotionData::default(),
            MotionVelocity::sphere(1.0, 0.5).with_linear(Vec3::new(0.0, -2.0, 0.0)),
        );
        world
    }

    #[test]
    fn test_full_step_schedule() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::RaiseCollisionEvents);
        let report = simulation.step(&mut world, &input()).expect("step");

        assert_eq!(
            report.states,
            vec![
                StepState::Idle,
                StepState::SyncIn,
                StepState::Broadphase,
                StepState::Narrowphase,
                StepState::SolverPrep,
                StepState::SolverSolve,
                StepState::SyncOut,
                StepState::Idle,
            ]
        );
        assert_eq!(report.executed.first(), Some(&StepTask::SyncIn));
        assert_eq!(report.executed.last(), Some(&StepTask::ExtractMotions));
        assert!(report.static_bodies_synchronized);
        assert_eq!(report.num_manifolds, 1);
        assert_eq!(report.num_collision_events, 1);
        assert_eq!(simulation.state(), StepState::Idle);

        let events: Vec<_> = simulation
            .collision_events(&world)
            .iter()
            .collect::<PhysicsResult<_>>()
            .expect("events");
        assert_eq!(events[0].entity_a, Entity::new(11, 1));
        assert!((events[0].input_velocity_a.linear().y - (-2.0 - 9.81 / 60.0)).abs() < 1e-5);
        // Body positions follow the integrated motion
        assert_eq!(world.bodies[0].position, world.motion_datas[0].position);
    }

    #[test]
    fn test_static_bodies_sync_on_demand() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::Collide);
        assert!(simulation.step(&mut world, &input()).expect("step").static_bodies_synchronized);
        assert!(!simulation.step(&mut world, &input()).expect("step").static_bodies_synchronized);

        simulation.static_bodies_changed_flag().store(true, Ordering::Release);
        assert!(simulation.step(&mut world, &input()).expect("step").static_bodies_synchronized);

        world.add_static_body(RigidBody::sphere(Entity::new(12, 1), Vec3::new(5.0, 0.0, 0.0), 0.5));
        assert!(simulation.step(&mut world, &input()).expect("step").static_bodies_synchronized);
    }

    #[test]
    fn test_static_only_world_exits_early() {
        init_logging();
        let concrete = Arc::new(parking_lot::RwLock::new(ReferenceBackend::new()));
        let backend: SharedBackend = concrete.clone();
        let token = negotiate(&*backend.read(), Entitlement::Granted).expect("negotiate");
        let mut simulation = Simulation::new(backend, token, PhysicsConfiguration::default()).expect("simulation");
        let mut world = PhysicsWorld::new();
        world.add_static_body(RigidBody::sphere(Entity::new(1, 1), Vec3::ZERO, 1.0));
        world.add_static_body(RigidBody::sphere(Entity::new(2, 1), Vec3::new(0.5, 0.0, 0.0), 1.0));
        let before = world.bodies.clone();

        let report = simulation.step(&mut world, &input()).expect("step");
        assert_eq!(report.executed, vec![StepTask::SyncIn]);
        assert_eq!(report.states, vec![StepState::Idle, StepState::SyncIn, StepState::Idle]);
        assert!(simulation.collision_events(&world).is_empty());
        assert!(simulation.trigger_events(&world).is_empty());
        assert_eq!(world.bodies, before);

        let backend = concrete.read();
        let backend_world = backend.world(simulation.handle()).expect("backend world");
        assert_eq!(backend_world.step_count, 0);
        assert!(backend_world.debugger.is_none());
        assert!(backend_world.debug_contacts.is_empty());
    }

    #[test]
    fn test_debugger_only_step() {
        let mut config = PhysicsConfiguration::default();
        config.visual_debugger.enable = true;
        let mut simulation = simulation(Entitlement::Granted, config);
        let mut world = PhysicsWorld::new();
        world.add_static_body(RigidBody::sphere(Entity::new(1, 1), Vec3::ZERO, 1.0));

        let report = simulation.step(&mut world, &input()).expect("step");
        assert_eq!(report.executed, vec![StepTask::SyncIn, StepTask::VisualDebugger]);
        assert_eq!(
            report.states,
            vec![StepState::Idle, StepState::SyncIn, StepState::VisualDebuggerStep, StepState::Idle]
        );
    }

    #[test]
    fn test_denied_entitlement_skips_steps() {
        let denied = Entitlement::Denied {
            reason: "trial expired".to_string(),
        };
        let mut simulation = simulation(denied, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::Collide);
        let before = world.motion_datas.clone();

        for _ in 0..2 {
            let report = simulation.step(&mut world, &input()).expect("step");
            assert!(report.skipped);
            assert!(report.executed.is_empty());
        }
        assert_eq!(world.motion_datas, before);
    }

    #[test]
    fn test_disabled_contact_is_not_solved() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::RaiseCollisionEvents);
        let mut callbacks = SimulationCallbacks::new();
        callbacks.enqueue(CallbackPhase::PostCreateContacts, |access| {
            access
                .modify_contacts(&mut |header: &mut ModifiableContactHeader, _: &mut ModifiableContactPoint| {
                    header.set_flag(JacobianFlags::DISABLED, true)
                })
                .map(|_| ())
        });

        let report = simulation
            .step_with_callbacks(&mut world, &input(), &mut callbacks)
            .expect("step");
        assert_eq!(report.callbacks_run, 1);
        assert_eq!(report.num_collision_events, 0);
        // Nothing stopped the fall
        assert!(world.motion_velocities[0].linear[1] < -2.0);
    }

    #[test]
    fn test_disabled_cache_flags_prepared_jacobian() {
        init_logging();
        let world = falling_world(CollisionResponse::Collide);
        let mut backend = ReferenceBackend::new();
        let handle = backend
            .allocate_world(&PhysicsConfiguration::default())
            .expect("allocate");
        let sync = SyncInput {
            bodies: StridedSlice::from_slice(&world.bodies),
            motion_datas: StridedSlice::from_slice(&world.motion_datas),
            motion_velocities: StridedSlice::from_slice(&world.motion_velocities),
            joints: StridedSlice::from_slice(&world.joints),
            num_dynamic_bodies: world.num_dynamic_bodies(),
            synchronize_static_bodies: true,
        };
        let mut context = StepContext::new();
        context.begin_step();
        backend.sync_world_in(handle, &sync, &mut context).expect("sync");
        backend
            .step_world(
                handle,
                &StepParameters {
                    time_step: 1.0 / 60.0,
                    gravity: Vec3::new(0.0, -9.81, 0.0),
                    solver_iterations: 4,
                    thread_count: 1,
                },
            )
            .expect("start");
        for phase in [BackendPhase::Broadphase, BackendPhase::Narrowphase, BackendPhase::SolverPrep] {
            backend.process_phase(handle, phase, &mut context).expect("phase");
        }

        let cache = &mut context.collision_caches[0];
        cache.set_jacobian_flags(cache.jacobian_flags() | JacobianFlags::DISABLED);
        assert_eq!(flag_disabled_jacobians(&mut context).expect("flag"), 1);
        assert_eq!(flag_disabled_jacobians(&mut context).expect("flag again"), 0);

        context.invalidate();
        assert!(flag_disabled_jacobians(&mut context).is_err());
    }

    #[test]
    fn test_failed_callback_aborts_step() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::Collide);
        let before = world.motion_datas.clone();
        let mut callbacks = SimulationCallbacks::new();
        callbacks.enqueue(CallbackPhase::PostCreateContactJacobians, |_| {
            Err(PhysicsError::FeatureDisabled("test".to_string()))
        });

        let error = simulation
            .step_with_callbacks(&mut world, &input(), &mut callbacks)
            .expect_err("callback fails");
        assert!(matches!(error, PhysicsError::CallbackFailed { .. }));
        assert_eq!(simulation.state(), StepState::Idle);
        assert!(!simulation.context().is_valid());
        assert_eq!(world.motion_datas, before);

        callbacks.clear();
        simulation.step(&mut world, &input()).expect("next step runs");
    }

    #[test]
    fn test_configure_updates_both_sides() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        simulation.configure("enable_sleeping", "false").expect("configure");
        assert!(!simulation.config().enable_sleeping);
        assert!(simulation.configure("no.such.key", "1").is_err());
    }

    #[test]
    fn test_many_bodies_extract_in_batches() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = PhysicsWorld::new();
        for i in 0..300 {
            let position = Vec3::new((i % 20) as f32 * 3.0, 10.0, (i / 20) as f32 * 3.0);
            world.add_dynamic_body(
                RigidBody::sphere(Entity::new(i, 1), position, 0.5),
                MotionData::default(),
                MotionVelocity::sphere(1.0, 0.5),
            );
        }
        simulation.step(&mut world, &input()).expect("step");
        assert!(world.motion_datas.iter().all(|m| m.position[1] < 10.0));
        assert!(world.motion_velocities.iter().all(|v| v.linear[1] < 0.0));
    }

    #[test]
    fn test_mismatched_motion_arrays_fail_the_step() {
        let mut simulation = simulation(Entitlement::Granted, PhysicsConfiguration::default());
        let mut world = falling_world(CollisionResponse::Collide);
        world.motion_datas.push(MotionData::default());
        world.motion_velocities.push(MotionVelocity::default());
        world.motion_datas.push(MotionData::default());
        world.motion_velocities.push(MotionVelocity::default());

        assert!(matches!(
            simulation.step(&mut world, &input()),
            Err(PhysicsError::BufferTooSmall { required: 3, available: 2, .. })
        ));
        assert_eq!(simulation.state(), StepState::Idle);

        world.motion_datas.truncate(1);
        world.motion_velocities.truncate(1);
        let report = simulation.step(&mut world, &input()).expect("step after repair");
        assert!(report.executed.contains(&StepTask::ExtractMotions));
        assert_eq!(simulation.state(), StepState::Idle);
    }

    /// Reference backend whose extraction fails past the first batch
    struct FailingExtraction {
        inner: ReferenceBackend,
    }

    impl SteppingBackend for FailingExtraction {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn layout_manifest(&self) -> LayoutManifest {
            self.inner.layout_manifest()
        }

        fn allocate_world(&mut self, config: &PhysicsConfiguration) -> PhysicsResult<WorldHandle> {
            self.inner.allocate_world(config)
        }

        fn destroy_world(&mut self, world: WorldHandle) -> PhysicsResult<()> {
            self.inner.destroy_world(world)
        }

        fn sync_world_in(
            &mut self,
            world: WorldHandle,
            input: &SyncInput<'_>,
            context: &mut StepContext,
        ) -> PhysicsResult<()> {
            self.inner.sync_world_in(world, input, context)
        }

        fn step_world(&mut self, world: WorldHandle, parameters: &StepParameters) -> PhysicsResult<()> {
            self.inner.step_world(world, parameters)
        }

        fn process_phase(
            &mut self,
            world: WorldHandle,
            phase: BackendPhase,
            context: &mut StepContext,
        ) -> PhysicsResult<()> {
            self.inner.process_phase(world, phase, context)
        }

        fn sync_motions_out(
            &self,
            world: WorldHandle,
            start_index: usize,
            motion_datas: &mut [MotionData],
            motion_velocities: &mut [MotionVelocity],
        ) -> PhysicsResult<()> {
            if start_index > 0 {
                return Err(PhysicsError::BackendError {
                    operation: "sync_motions_out".to_string(),
                    error: format!("batch at {} unavailable", start_index),
                });
            }
            self.inner.sync_motions_out(world, start_index, motion_datas, motion_velocities)
        }

        fn step_visual_debugger(
            &mut self,
            world: WorldHandle,
            time_step: f32,
            camera: Option<&DebugCamera>,
        ) -> PhysicsResult<()> {
            self.inner.step_visual_debugger(world, time_step, camera)
        }

        fn configure(&mut self, world: WorldHandle, key: &str, value: &str) -> PhysicsResult<()> {
            self.inner.configure(world, key, value)
        }
    }

    #[test]
    fn test_failed_extraction_leaves_motions_untouched() {
        init_logging();
        let backend = create_shared_backend(FailingExtraction { inner: ReferenceBackend::new() });
        let token = negotiate(&*backend.read(), Entitlement::Granted).expect("negotiate");
        let mut simulation = Simulation::new(backend, token, PhysicsConfiguration::default()).expect("simulation");

        let mut world = PhysicsWorld::new();
        for i in 0..(MOTION_EXTRACTION_BATCH_SIZE as i32 * 2) {
            let position = Vec3::new((i % 16) as f32 * 3.0, 10.0, (i / 16) as f32 * 3.0);
            world.add_dynamic_body(
                RigidBody::sphere(Entity::new(i, 1), position, 0.5),
                MotionData::default(),
                MotionVelocity::sphere(1.0, 0.5),
            );
        }
        let datas = world.motion_datas.clone();
        let velocities = world.motion_velocities.clone();

        assert!(matches!(
            simulation.step(&mut world, &input()),
            Err(PhysicsError::BackendError { .. })
        ));
        assert_eq!(simulation.state(), StepState::Idle);
        assert_eq!(world.motion_datas, datas);
        assert_eq!(world.motion_velocities, velocities);
    }
}
