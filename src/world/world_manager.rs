//! World Manager - owns every simulation created on one backend

use rustc_hash::FxHashMap;

use crate::backend::{negotiate, CapabilityToken, Entitlement, SharedBackend};
use crate::body::PhysicsWorld;
use crate::config::PhysicsConfiguration;
use crate::error::{OptionExt, PhysicsError, PhysicsResult};
use crate::pipeline::{Simulation, StepInput, StepReport};

/// Engine-side id of a managed world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub u32);

pub struct WorldManager {
    backend: SharedBackend,
    token: CapabilityToken,
    simulations: FxHashMap<WorldId, Simulation>,
    next_id: u32,
}

impl std::fmt::Debug for WorldManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldManager")
            .field("backend", &self.token.backend_name())
            .field("worlds", &self.simulations.len())
            .finish()
    }
}

impl WorldManager {
    /// Negotiate with `backend` once; every world shares the resulting token
    pub fn new(backend: SharedBackend, entitlement: Entitlement) -> PhysicsResult<Self> {
        let token = {
            let guard = backend.read();
            negotiate(&*guard, entitlement)?
        };
        Ok(Self {
            backend,
            token,
            simulations: FxHashMap::default(),
            next_id: 0,
        })
    }

    pub fn capability(&self) -> &CapabilityToken {
        &self.token
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn create_world(&mut self, config: PhysicsConfiguration) -> PhysicsResult<WorldId> {
        let simulation = Simulation::new(self.backend.clone(), self.token.clone(), config)?;
        let id = WorldId(self.next_id);
        self.next_id += 1;
        self.simulations.insert(id, simulation);
        log::info!(
            "[WorldManager::create_world] World {:?} -> backend world {}",
            id,
            self.simulations.get(&id).map(|s| s.handle().0).unwrap_or_default()
        );
        Ok(id)
    }

    /// Drops the simulation, which releases its backend world
    pub fn destroy_world(&mut self, id: WorldId) -> PhysicsResult<()> {
        self.simulations
            .remove(&id)
            .ok_or(PhysicsError::WorldNotFound(id.0))?;
        log::info!("[WorldManager::destroy_world] World {:?} destroyed", id);
        Ok(())
    }

    pub fn step_world(
        &mut self,
        id: WorldId,
        world: &mut PhysicsWorld,
        input: &StepInput,
    ) -> PhysicsResult<StepReport> {
        self.simulation_mut(id)?.step(world, input)
    }

    pub fn simulation(&self, id: WorldId) -> PhysicsResult<&Simulation> {
        self.simulations
            .get(&id)
            .ok_or_physics(|| PhysicsError::WorldNotFound(id.0))
    }

    pub fn simulation_mut(&mut self, id: WorldId) -> PhysicsResult<&mut Simulation> {
        self.simulations
            .get_mut(&id)
            .ok_or_physics(|| PhysicsError::WorldNotFound(id.0))
    }

    pub fn world_count(&self) -> usize {
        self.simulations.len()
    }

    /// Ids in creation order
    pub fn world_ids(&self) -> Vec<WorldId> {
        let mut ids: Vec<_> = self.simulations.keys().copied().collect();
        ids.sort();
        ids
    }
}
