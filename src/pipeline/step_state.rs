//! Step state machine
//!
//! A world moves through the phases in a fixed order once per tick:
//!
//! ```text
//! Idle -> SyncIn -> Broadphase -> Narrowphase -> SolverPrep -> SolverSolve
//!      -> [VisualDebuggerStep] -> SyncOut -> Idle
//! ```
//!
//! `SyncIn -> Idle` is the early exit for a world without dynamic bodies and
//! `SyncIn -> VisualDebuggerStep -> Idle` the same exit with the debugger on.

use crate::error::{PhysicsError, PhysicsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepState {
    Idle = 0,
    SyncIn = 1,
    Broadphase = 2,
    Narrowphase = 3,
    SolverPrep = 4,
    SolverSolve = 5,
    VisualDebuggerStep = 6,
    SyncOut = 7,
}

impl StepState {
    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(self, to: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, to),
            (Idle, SyncIn)
                | (SyncIn, Broadphase)
                | (SyncIn, Idle)
                | (SyncIn, VisualDebuggerStep)
                | (Broadphase, Narrowphase)
                | (Narrowphase, SolverPrep)
                | (SolverPrep, SolverSolve)
                | (SolverSolve, VisualDebuggerStep)
                | (SolverSolve, SyncOut)
                | (VisualDebuggerStep, SyncOut)
                | (VisualDebuggerStep, Idle)
                | (SyncOut, Idle)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            StepState::Idle => "Idle",
            StepState::SyncIn => "SyncIn",
            StepState::Broadphase => "Broadphase",
            StepState::Narrowphase => "Narrowphase",
            StepState::SolverPrep => "SolverPrep",
            StepState::SolverSolve => "SolverSolve",
            StepState::VisualDebuggerStep => "VisualDebuggerStep",
            StepState::SyncOut => "SyncOut",
        }
    }
}

/// Current state plus the states visited by the running step
#[derive(Debug)]
pub struct StepStateMachine {
    world: u32,
    state: StepState,
    history: Vec<StepState>,
    aborted: bool,
}

impl StepStateMachine {
    pub fn new(world: u32) -> Self {
        Self {
            world,
            state: StepState::Idle,
            history: Vec::with_capacity(8),
            aborted: false,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == StepState::Idle
    }

    /// Start a step; only one step may be in flight per world
    pub fn begin(&mut self) -> PhysicsResult<()> {
        if !self.is_idle() {
            return Err(PhysicsError::StepInFlight { world: self.world });
        }
        self.history.clear();
        self.history.push(StepState::Idle);
        self.aborted = false;
        self.advance(StepState::SyncIn)
    }

    pub fn advance(&mut self, to: StepState) -> PhysicsResult<()> {
        if !self.state.can_transition_to(to) {
            log::error!(
                "[StepStateMachine::advance] World {}: illegal transition {:?} -> {:?}",
                self.world,
                self.state,
                to
            );
            return Err(PhysicsError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::trace!("[StepStateMachine::advance] World {}: {:?} -> {:?}", self.world, self.state, to);
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Drop back to Idle without completing the step
    pub fn abort(&mut self) {
        if !self.is_idle() {
            log::error!(
                "[StepStateMachine::abort] World {}: step aborted in {:?}",
                self.world,
                self.state
            );
        }
        self.state = StepState::Idle;
        self.aborted = true;
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    pub fn history(&self) -> &[StepState] {
        &self.history
    }

    /// CRC over the visited states; equal schedules give equal digests
    pub fn schedule_digest(&self) -> u32 {
        let bytes: Vec<u8> = self.history.iter().map(|s| *s as u8).collect();
        crc32fast::hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut StepStateMachine, states: &[StepState]) -> PhysicsResult<()> {
        machine.begin()?;
        for &state in states {
            machine.advance(state)?;
        }
        Ok(())
    }

    #[test]
    fn test_full_step_sequence() {
        let mut machine = StepStateMachine::new(0);
        run(
            &mut machine,
            &[
                StepState::Broadphase,
                StepState::Narrowphase,
                StepState::SolverPrep,
                StepState::SolverSolve,
                StepState::SyncOut,
                StepState::Idle,
            ],
        )
        .expect("legal sequence");
        assert!(machine.is_idle());
        assert_eq!(machine.history().len(), 8);
    }

    #[test]
    fn test_early_exit_paths() {
        let mut machine = StepStateMachine::new(0);
        run(&mut machine, &[StepState::Idle]).expect("no dynamic bodies");
        assert_eq!(machine.history(), &[StepState::Idle, StepState::SyncIn, StepState::Idle]);

        run(&mut machine, &[StepState::VisualDebuggerStep, StepState::Idle]).expect("debugger only");
    }

    #[test]
    fn test_illegal_transition_is_fatal() {
        let mut machine = StepStateMachine::new(0);
        machine.begin().expect("begin");
        let err = machine.advance(StepState::SolverSolve).expect_err("skips phases");
        assert!(err.is_fatal());
        assert_eq!(machine.state(), StepState::SyncIn);
    }

    #[test]
    fn test_single_flight() {
        let mut machine = StepStateMachine::new(7);
        machine.begin().expect("begin");
        assert!(matches!(machine.begin(), Err(PhysicsError::StepInFlight { world: 7 })));
        machine.abort();
        assert!(machine.was_aborted());
        assert!(machine.begin().is_ok());
    }

    #[test]
    fn test_schedule_digest_distinguishes_paths() {
        let mut early = StepStateMachine::new(0);
        run(&mut early, &[StepState::Idle]).expect("early exit");

        let mut debug = StepStateMachine::new(0);
        run(&mut debug, &[StepState::VisualDebuggerStep, StepState::Idle]).expect("debugger");

        let mut again = StepStateMachine::new(1);
        run(&mut again, &[StepState::Idle]).expect("early exit");

        assert_ne!(early.schedule_digest(), debug.schedule_digest());
        assert_eq!(early.schedule_digest(), again.schedule_digest());
    }
}
