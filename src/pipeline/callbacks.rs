//! Simulation callbacks run at phase boundaries
//!
//! Callbacks registered for the same boundary run in registration order.
//! Each gets a [`PhaseAccess`] that only allows the modifier job belonging
//! to that boundary; the event readers are available at every boundary but
//! only carry data once the solver has run.

use crate::body::{PhysicsWorld, Velocity};
use crate::error::{PhysicsError, PhysicsResult};
use crate::events::{CollisionEvents, TriggerEvents};
use crate::modify::{
    run_body_pairs_job, run_contacts_job, run_jacobians_job, BodyPairsJob, ContactsJob, JacobiansJob,
};
use crate::pipeline::StepContext;

/// Boundary between two phases where callbacks may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackPhase {
    /// After the broadphase wrote body pairs
    PostCreateDispatchPairs,
    /// After the narrowphase wrote manifolds
    PostCreateContacts,
    /// After solver preparation wrote Jacobians
    PostCreateContactJacobians,
    /// After the solver ran, before motions are extracted
    PostSolveJacobians,
}

impl CallbackPhase {
    pub fn name(self) -> &'static str {
        match self {
            CallbackPhase::PostCreateDispatchPairs => "PostCreateDispatchPairs",
            CallbackPhase::PostCreateContacts => "PostCreateContacts",
            CallbackPhase::PostCreateContactJacobians => "PostCreateContactJacobians",
            CallbackPhase::PostSolveJacobians => "PostSolveJacobians",
        }
    }
}

/// What a callback can reach at its boundary
pub struct PhaseAccess<'a> {
    phase: CallbackPhase,
    context: &'a mut StepContext,
    world: &'a PhysicsWorld,
    input_velocities: &'a [Velocity],
    time_step: f32,
}

impl<'a> PhaseAccess<'a> {
    pub(crate) fn new(
        phase: CallbackPhase,
        context: &'a mut StepContext,
        world: &'a PhysicsWorld,
        input_velocities: &'a [Velocity],
        time_step: f32,
    ) -> Self {
        Self {
            phase,
            context,
            world,
            input_velocities,
            time_step,
        }
    }

    pub fn phase(&self) -> CallbackPhase {
        self.phase
    }

    pub fn world(&self) -> &PhysicsWorld {
        self.world
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    fn require(&self, operation: &str, expected: CallbackPhase) -> PhysicsResult<()> {
        if self.phase == expected {
            return Ok(());
        }
        Err(PhysicsError::PhaseMismatch {
            operation: operation.to_string(),
            expected: expected.name().to_string(),
            actual: self.phase.name().to_string(),
        })
    }

    /// Returns the number of pairs disabled
    pub fn modify_body_pairs<J>(&mut self, job: &mut J) -> PhysicsResult<usize>
    where
        J: BodyPairsJob + ?Sized,
    {
        self.require("modify_body_pairs", CallbackPhase::PostCreateDispatchPairs)?;
        run_body_pairs_job(self.context, self.world, job)
    }

    /// Returns the number of manifold headers written back
    pub fn modify_contacts<J>(&mut self, job: &mut J) -> PhysicsResult<usize>
    where
        J: ContactsJob + ?Sized,
    {
        self.require("modify_contacts", CallbackPhase::PostCreateContacts)?;
        run_contacts_job(self.context, self.world, job)
    }

    /// Returns the number of Jacobians visited
    pub fn modify_jacobians<J>(&mut self, job: &mut J) -> PhysicsResult<usize>
    where
        J: JacobiansJob + ?Sized,
    {
        self.require("modify_jacobians", CallbackPhase::PostCreateContactJacobians)?;
        run_jacobians_job(self.context, self.world, self.time_step, job)
    }

    pub fn collision_events(&self) -> CollisionEvents<'_> {
        CollisionEvents::new(self.context, self.world, self.input_velocities, self.time_step)
    }

    pub fn trigger_events(&self) -> TriggerEvents<'_> {
        TriggerEvents::new(self.context, self.world)
    }
}

/// A callback run at one boundary
pub type SimulationCallback = Box<dyn FnMut(&mut PhaseAccess<'_>) -> PhysicsResult<()> + Send>;

/// Callbacks for the next steps, grouped by boundary. The simulation does
/// not clear them; call [`SimulationCallbacks::clear`] for per-step use.
#[derive(Default)]
pub struct SimulationCallbacks {
    callbacks: Vec<(CallbackPhase, SimulationCallback)>,
}

impl std::fmt::Debug for SimulationCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phases: Vec<_> = self.callbacks.iter().map(|(phase, _)| phase).collect();
        f.debug_struct("SimulationCallbacks").field("phases", &phases).finish()
    }
}

impl SimulationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<F>(&mut self, phase: CallbackPhase, callback: F)
    where
        F: FnMut(&mut PhaseAccess<'_>) -> PhysicsResult<()> + Send + 'static,
    {
        self.callbacks.push((phase, Box::new(callback)));
    }

    pub fn any(&self, phase: CallbackPhase) -> bool {
        self.callbacks.iter().any(|(p, _)| *p == phase)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// Run every callback of `access.phase()`. Phase mismatches and fatal
    /// errors pass through; anything else is wrapped in `CallbackFailed`.
    pub(crate) fn run(&mut self, access: &mut PhaseAccess<'_>) -> PhysicsResult<usize> {
        let phase = access.phase();
        let mut ran = 0;
        for (_, callback) in self.callbacks.iter_mut().filter(|(p, _)| *p == phase) {
            callback(&mut *access).map_err(|error| match error {
                PhysicsError::PhaseMismatch { .. } => error,
                error if error.is_fatal() => error,
                error => PhysicsError::CallbackFailed {
                    phase: phase.name().to_string(),
                    error: error.to_string(),
                },
            })?;
            ran += 1;
        }
        if ran > 0 {
            log::trace!("[SimulationCallbacks::run] {} callbacks at {}", ran, phase.name());
        }
        Ok(ran)
    }
}
