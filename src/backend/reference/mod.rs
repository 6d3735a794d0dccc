//! Reference backend - a from-scratch solver for sphere colliders
//!
//! - aabb.rs: bounds used by the broadphase
//! - broadphase.rs: sweep and prune on X
//! - narrowphase.rs: sphere-sphere manifolds and collision caches
//! - solver_prep.rs: Jacobian records in fixed and moving grids
//! - solver.rs: sequential impulses, integration, sleeping, events
//! - debugger.rs: the visual debugger frame stream

pub mod aabb;
pub mod broadphase;
pub mod debugger;
pub mod narrowphase;
pub mod solver;
pub mod solver_prep;

pub use debugger::{decode_frame, DebugBody, DebugContact, DebugFrame, VisualDebuggerServer};

use bit_vec::BitVec;
use cgmath::Point3;
use crossbeam_channel::Receiver;
use glam::Vec3;
use rustc_hash::FxHashMap;

use super::{BackendPhase, StepParameters, SteppingBackend, SyncInput, WorldHandle};
use crate::body::{Joint, MotionData, MotionVelocity, RigidBody};
use crate::camera::{camera_data_from_debug_camera, default_debug_camera, sphere_in_view, DebugCamera};
use crate::config::{apply_override, PhysicsConfiguration};
use crate::constants::body::FIRST_BODY_ID;
use crate::constants::contact::MAX_CONTACT_POINTS;
use crate::constants::solver::{SLEEP_ANGULAR_THRESHOLD, SLEEP_LINEAR_THRESHOLD};
use crate::error::{PhysicsError, PhysicsResult};
use crate::pipeline::StepContext;
use crate::records::{ContactPointRecord, LayoutManifest};

/// Contact points of one manifold as the solver saw them
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PreparedManifold {
    pub points: [ContactPointRecord; MAX_CONTACT_POINTS],
    pub num_points: usize,
    pub collider_keys: (u32, u32),
}

impl PreparedManifold {
    pub fn new(points: &[ContactPointRecord], collider_keys: (u32, u32)) -> Self {
        let mut prepared = Self {
            num_points: points.len().min(MAX_CONTACT_POINTS),
            collider_keys,
            ..Self::default()
        };
        prepared.points[..prepared.num_points].copy_from_slice(&points[..prepared.num_points]);
        prepared
    }

    pub fn points(&self) -> &[ContactPointRecord] {
        &self.points[..self.num_points]
    }

    pub fn min_distance(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.distance)
            .fold(f32::INFINITY, f32::min)
    }
}

/// Velocity state and mass properties of a body during the solve
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SolverBody {
    pub position: Vec3,
    pub linear: Vec3,
    pub angular: Vec3,
    pub inverse_mass: f32,
    pub inverse_inertia: Vec3,
}

/// Backend-side copy of one engine world
#[derive(Debug)]
pub(crate) struct ReferenceWorld {
    pub config: PhysicsConfiguration,
    pub dynamic_bodies: Vec<RigidBody>,
    pub static_bodies: Vec<RigidBody>,
    pub motion_datas: Vec<MotionData>,
    pub motion_velocities: Vec<MotionVelocity>,
    pub joints: Vec<Joint>,
    pub parameters: StepParameters,
    /// Normal impulse per backend id pair, carried to the next step
    pub warm_start: FxHashMap<(u32, u32), f32>,
    pub asleep: BitVec,
    pub resting_frames: Vec<u32>,
    /// Indexed by collision cache index
    pub prepared: Vec<PreparedManifold>,
    pub debug_contacts: Vec<DebugContact>,
    pub debugger: Option<VisualDebuggerServer>,
    pub step_count: u64,
}

impl ReferenceWorld {
    fn new(config: &PhysicsConfiguration) -> Self {
        let debugger = config
            .visual_debugger
            .enable
            .then(|| VisualDebuggerServer::new(&config.visual_debugger, 1));
        Self {
            config: *config,
            dynamic_bodies: Vec::new(),
            static_bodies: Vec::new(),
            motion_datas: Vec::new(),
            motion_velocities: Vec::new(),
            joints: Vec::new(),
            parameters: StepParameters {
                time_step: 1.0 / 60.0,
                gravity: Vec3::ZERO,
                solver_iterations: config.solver.default_iterations,
                thread_count: 1,
            },
            warm_start: FxHashMap::default(),
            asleep: BitVec::new(),
            resting_frames: Vec::new(),
            prepared: Vec::new(),
            debug_contacts: Vec::new(),
            debugger,
            step_count: 0,
        }
    }

    pub fn num_dynamic(&self) -> usize {
        self.dynamic_bodies.len()
    }

    pub fn num_bodies(&self) -> usize {
        self.dynamic_bodies.len() + self.static_bodies.len()
    }

    pub fn is_dynamic(&self, index: usize) -> bool {
        index < self.num_dynamic()
    }

    pub fn body(&self, index: usize) -> Option<&RigidBody> {
        match index.checked_sub(self.num_dynamic()) {
            None => self.dynamic_bodies.get(index),
            Some(static_index) => self.static_bodies.get(static_index),
        }
    }

    pub fn body_id(index: usize) -> u32 {
        index as u32 + FIRST_BODY_ID
    }

    /// Dynamic positions come from the integrated motion
    pub fn position(&self, index: usize) -> Vec3 {
        if let Some(motion) = self.motion_datas.get(index) {
            return Vec3::from_array(motion.position);
        }
        self.body(index)
            .map(|body| Vec3::from_array(body.position))
            .unwrap_or(Vec3::ZERO)
    }

    pub fn is_asleep(&self, index: usize) -> bool {
        self.asleep.get(index).unwrap_or(false)
    }

    /// Dynamic and not sleeping
    pub fn is_awake(&self, index: usize) -> bool {
        self.is_dynamic(index) && !self.is_asleep(index)
    }

    pub fn wake(&mut self, index: usize) {
        if self.is_asleep(index) {
            self.asleep.set(index, false);
            log::trace!("[ReferenceBackend::wake] Body {} woke up", index);
        }
        if let Some(frames) = self.resting_frames.get_mut(index) {
            *frames = 0;
        }
    }

    /// Static bodies have zero inverse mass and velocity
    pub fn solver_body(&self, index: usize) -> SolverBody {
        match self.motion_velocities.get(index) {
            Some(velocity) => SolverBody {
                position: self.position(index),
                linear: Vec3::from_array(velocity.linear),
                angular: Vec3::from_array(velocity.angular),
                inverse_mass: velocity.inverse_mass,
                inverse_inertia: Vec3::from_array(velocity.inverse_inertia),
            },
            None => SolverBody {
                position: self.position(index),
                ..SolverBody::default()
            },
        }
    }

    fn sync_in(&mut self, input: &SyncInput<'_>, context: &mut StepContext) -> PhysicsResult<()> {
        let num_dynamic = input.num_dynamic_bodies;
        if num_dynamic > input.bodies.len()
            || input.motion_datas.len() < num_dynamic
            || input.motion_velocities.len() < num_dynamic
        {
            return Err(PhysicsError::BufferTooSmall {
                name: "dynamic motions".to_string(),
                required: num_dynamic,
                available: input.motion_datas.len().min(input.motion_velocities.len()),
            });
        }

        self.dynamic_bodies = input.bodies.iter().take(num_dynamic).collect();
        self.motion_datas = input.motion_datas.iter().take(num_dynamic).collect();
        self.motion_velocities = input.motion_velocities.iter().take(num_dynamic).collect();
        if input.synchronize_static_bodies {
            self.static_bodies = input.bodies.iter().skip(num_dynamic).collect();
            log::debug!(
                "[ReferenceBackend::sync_world_in] {} static bodies synchronized",
                self.static_bodies.len()
            );
        }
        self.joints = input.joints.iter().collect();

        if self.asleep.len() != num_dynamic {
            self.asleep = BitVec::from_elem(num_dynamic, false);
            self.resting_frames = vec![0; num_dynamic];
        }
        // A sleeping body the engine set in motion wakes up
        for index in 0..num_dynamic {
            let velocity = &self.motion_velocities[index];
            if self.is_asleep(index)
                && (Vec3::from_array(velocity.linear).length() > SLEEP_LINEAR_THRESHOLD
                    || Vec3::from_array(velocity.angular).length() > SLEEP_ANGULAR_THRESHOLD)
            {
                self.wake(index);
            }
        }

        context.body_index_to_local.clear();
        for index in 0..self.num_bodies() {
            context
                .body_index_to_local
                .insert(Self::body_id(index), index as i32);
        }
        Ok(())
    }

    fn start_step(&mut self, parameters: &StepParameters) {
        self.parameters = *parameters;
        self.step_count += 1;

        let gravity_step = parameters.gravity * parameters.time_step;
        for index in 0..self.num_dynamic() {
            if self.is_asleep(index) {
                continue;
            }
            let velocity = &mut self.motion_velocities[index];
            if velocity.inverse_mass <= 0.0 {
                continue;
            }
            let factor = self.motion_datas[index].gravity_factor;
            let linear = Vec3::from_array(velocity.linear) + gravity_step * factor;
            velocity.linear = linear.to_array();
        }
    }

    /// Bodies outside the camera frustum are left out
    fn debug_frame(&self, time_step: f32, camera: DebugCamera) -> DebugFrame {
        let view = camera_data_from_debug_camera(&camera);
        let bodies = (0..self.num_bodies())
            .filter_map(|index| {
                let body = self.body(index)?;
                let center = Point3::from(self.position(index).to_array());
                sphere_in_view(&view, center, body.collider_radius).then(|| DebugBody {
                    entity_index: body.entity.index,
                    entity_version: body.entity.version,
                    position: self.position(index).to_array(),
                    radius: body.collider_radius,
                    dynamic: self.is_dynamic(index),
                    asleep: self.is_asleep(index),
                })
            })
            .collect();
        DebugFrame {
            step_index: self.step_count,
            time_step,
            camera,
            bodies,
            contacts: self.debug_contacts.clone(),
        }
    }

    /// Create or drop the debugger to match the configuration
    fn apply_debugger_config(&mut self) {
        match (self.config.visual_debugger.enable, self.debugger.is_some()) {
            (true, false) => {
                self.debugger = Some(VisualDebuggerServer::new(
                    &self.config.visual_debugger,
                    self.parameters.thread_count,
                ))
            }
            (false, true) => {
                log::info!("[ReferenceBackend::configure] Visual debugger stopped");
                self.debugger = None;
            }
            _ => {}
        }
    }
}

/// Worlds allocated in the reference backend
#[derive(Debug, Default)]
pub struct ReferenceBackend {
    worlds: FxHashMap<u32, ReferenceWorld>,
    next_world: u32,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    pub(crate) fn world(&self, handle: WorldHandle) -> PhysicsResult<&ReferenceWorld> {
        self.worlds
            .get(&handle.0)
            .ok_or(PhysicsError::WorldNotFound(handle.0))
    }

    pub(crate) fn world_mut(&mut self, handle: WorldHandle) -> PhysicsResult<&mut ReferenceWorld> {
        self.worlds
            .get_mut(&handle.0)
            .ok_or(PhysicsError::WorldNotFound(handle.0))
    }

    /// Frames of the world's visual debugger, `bincode` encoded
    pub fn subscribe_visual_debugger(&mut self, handle: WorldHandle) -> PhysicsResult<Receiver<Vec<u8>>> {
        self.world_mut(handle)?
            .debugger
            .as_mut()
            .map(VisualDebuggerServer::subscribe)
            .ok_or_else(|| PhysicsError::FeatureDisabled("visual debugger is not enabled".to_string()))
    }

    /// Whether dynamic body `index` is sleeping
    pub fn is_body_asleep(&self, handle: WorldHandle, index: usize) -> PhysicsResult<bool> {
        Ok(self.world(handle)?.is_asleep(index))
    }
}

impl SteppingBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn layout_manifest(&self) -> LayoutManifest {
        LayoutManifest::binding()
    }

    fn allocate_world(&mut self, config: &PhysicsConfiguration) -> PhysicsResult<WorldHandle> {
        let handle = WorldHandle(self.next_world);
        self.next_world += 1;
        self.worlds.insert(handle.0, ReferenceWorld::new(config));
        log::info!(
            "[ReferenceBackend::allocate_world] World {} allocated (sleeping {}, debugger {})",
            handle.0,
            config.enable_sleeping,
            config.visual_debugger.enable
        );
        Ok(handle)
    }

    fn destroy_world(&mut self, world: WorldHandle) -> PhysicsResult<()> {
        self.worlds
            .remove(&world.0)
            .ok_or(PhysicsError::WorldNotFound(world.0))?;
        log::info!("[ReferenceBackend::destroy_world] World {} destroyed", world.0);
        Ok(())
    }

    fn sync_world_in(
        &mut self,
        world: WorldHandle,
        input: &SyncInput<'_>,
        context: &mut StepContext,
    ) -> PhysicsResult<()> {
        self.world_mut(world)?.sync_in(input, context)
    }

    fn step_world(&mut self, world: WorldHandle, parameters: &StepParameters) -> PhysicsResult<()> {
        self.world_mut(world)?.start_step(parameters);
        Ok(())
    }

    fn process_phase(
        &mut self,
        world: WorldHandle,
        phase: BackendPhase,
        context: &mut StepContext,
    ) -> PhysicsResult<()> {
        let state = self.world_mut(world)?;
        match phase {
            BackendPhase::Broadphase => {
                let pairs = broadphase::find_pairs(state, context)?;
                log::trace!("[ReferenceBackend::broadphase] {} pairs", pairs);
            }
            BackendPhase::Narrowphase => {
                let manifolds = narrowphase::create_manifolds(state, context)?;
                log::trace!("[ReferenceBackend::narrowphase] {} manifolds", manifolds);
            }
            BackendPhase::SolverPrep => {
                let jacobians = solver_prep::build_jacobians(state, context)?;
                log::trace!("[ReferenceBackend::solver_prep] {} jacobians", jacobians);
            }
            BackendPhase::SolverSolve => {
                let summary = solver::solve(state, context)?;
                log::trace!(
                    "[ReferenceBackend::solve] {} jacobians, {} collision events, {} trigger events",
                    summary.jacobians,
                    summary.collision_events,
                    summary.trigger_events
                );
            }
        }
        Ok(())
    }

    fn sync_motions_out(
        &self,
        world: WorldHandle,
        start_index: usize,
        motion_datas: &mut [MotionData],
        motion_velocities: &mut [MotionVelocity],
    ) -> PhysicsResult<()> {
        let state = self.world(world)?;
        let end = start_index + motion_datas.len().max(motion_velocities.len());
        if end > state.num_dynamic() {
            return Err(PhysicsError::BodyIndexOutOfRange {
                index: end as i64 - 1,
                count: state.num_dynamic(),
            });
        }

        let datas = &state.motion_datas[start_index..start_index + motion_datas.len()];
        motion_datas.copy_from_slice(datas);
        let velocities = &state.motion_velocities[start_index..start_index + motion_velocities.len()];
        motion_velocities.copy_from_slice(velocities);
        Ok(())
    }

    fn step_visual_debugger(
        &mut self,
        world: WorldHandle,
        time_step: f32,
        camera: Option<&DebugCamera>,
    ) -> PhysicsResult<()> {
        let state = self.world_mut(world)?;
        if state.debugger.is_none() {
            return Ok(());
        }
        let camera = camera.copied().unwrap_or_else(default_debug_camera);
        let mut frame = state.debug_frame(time_step, camera);
        if let Some(server) = state.debugger.as_mut() {
            server.publish(&mut frame)?;
        }
        Ok(())
    }

    fn configure(&mut self, world: WorldHandle, key: &str, value: &str) -> PhysicsResult<()> {
        let state = self.world_mut(world)?;
        apply_override(&mut state.config, key, value)?;
        state.apply_debugger_config();
        Ok(())
    }
}
