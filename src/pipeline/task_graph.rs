//! Step task graph
//!
//! The units of work of one step and the completion edges between them.
//! The graph is rebuilt per step because its shape depends on whether the
//! world has dynamic bodies and whether the visual debugger is on.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Schedulable unit of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepTask {
    SyncIn,
    CopyInputVelocities,
    StartStep,
    Broadphase,
    Narrowphase,
    SolverPrep,
    SolverSolve,
    VisualDebugger,
    ExtractMotions,
}

impl StepTask {
    pub fn name(self) -> &'static str {
        match self {
            StepTask::SyncIn => "sync_in",
            StepTask::CopyInputVelocities => "copy_input_velocities",
            StepTask::StartStep => "start_step",
            StepTask::Broadphase => "broadphase",
            StepTask::Narrowphase => "narrowphase",
            StepTask::SolverPrep => "solver_prep",
            StepTask::SolverSolve => "solver_solve",
            StepTask::VisualDebugger => "visual_debugger",
            StepTask::ExtractMotions => "extract_motions",
        }
    }
}

#[derive(Debug, Clone)]
struct TaskNode {
    task: StepTask,
    depends_on: Vec<StepTask>,
}

/// Tasks of one step in dependency order
#[derive(Debug, Clone, Default)]
pub struct StepTaskGraph {
    nodes: Vec<TaskNode>,
    execution_order: Vec<StepTask>,
}

impl StepTaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph for a step of a world with the given shape
    pub fn for_step(has_dynamic_bodies: bool, visual_debugger: bool) -> PhysicsResult<Self> {
        let mut graph = Self::new();
        graph.register(StepTask::SyncIn, &[])?;

        if !has_dynamic_bodies {
            if visual_debugger {
                graph.register(StepTask::VisualDebugger, &[StepTask::SyncIn])?;
            }
            return Ok(graph);
        }

        graph.register(StepTask::CopyInputVelocities, &[StepTask::SyncIn])?;
        graph.register(StepTask::StartStep, &[StepTask::SyncIn])?;
        graph.register(StepTask::Broadphase, &[StepTask::StartStep])?;
        graph.register(StepTask::Narrowphase, &[StepTask::Broadphase])?;
        graph.register(StepTask::SolverPrep, &[StepTask::Narrowphase])?;
        // Input velocities must be captured before the solver changes them
        graph.register(
            StepTask::SolverSolve,
            &[StepTask::SolverPrep, StepTask::CopyInputVelocities],
        )?;
        if visual_debugger {
            graph.register(StepTask::VisualDebugger, &[StepTask::SolverSolve])?;
            graph.register(
                StepTask::ExtractMotions,
                &[StepTask::SolverSolve, StepTask::VisualDebugger],
            )?;
        } else {
            graph.register(StepTask::ExtractMotions, &[StepTask::SolverSolve])?;
        }
        Ok(graph)
    }

    /// Add a task; fails if the new edges close a cycle
    pub fn register(&mut self, task: StepTask, depends_on: &[StepTask]) -> PhysicsResult<()> {
        let previous = self.nodes.clone();
        match self.nodes.iter_mut().find(|node| node.task == task) {
            Some(node) => node.depends_on = depends_on.to_vec(),
            None => self.nodes.push(TaskNode {
                task,
                depends_on: depends_on.to_vec(),
            }),
        }
        if let Err(error) = self.update_execution_order() {
            self.nodes = previous;
            return Err(error);
        }
        Ok(())
    }

    pub fn execution_order(&self) -> &[StepTask] {
        &self.execution_order
    }

    pub fn contains(&self, task: StepTask) -> bool {
        self.nodes.iter().any(|node| node.task == task)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies(&self, task: StepTask) -> &[StepTask] {
        self.nodes
            .iter()
            .find(|node| node.task == task)
            .map(|node| node.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Topological sort in registration order
    fn update_execution_order(&mut self) -> PhysicsResult<()> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = FxHashSet::default();
        let mut visiting = FxHashSet::default();

        for node in &self.nodes {
            if !visited.contains(&node.task) {
                self.visit_task(node.task, &mut visited, &mut visiting, &mut order)?;
            }
        }

        self.execution_order = order;
        Ok(())
    }

    fn visit_task(
        &self,
        task: StepTask,
        visited: &mut FxHashSet<StepTask>,
        visiting: &mut FxHashSet<StepTask>,
        order: &mut Vec<StepTask>,
    ) -> PhysicsResult<()> {
        if visiting.contains(&task) {
            return Err(PhysicsError::Internal {
                message: format!("Circular step dependency involving {:?}", task),
            });
        }
        if visited.contains(&task) {
            return Ok(());
        }

        visiting.insert(task);
        for &dependency in self.dependencies(task) {
            if !self.contains(dependency) {
                return Err(PhysicsError::Internal {
                    message: format!("{:?} depends on unregistered {:?}", task, dependency),
                });
            }
            self.visit_task(dependency, visited, visiting, order)?;
        }
        visiting.remove(&task);
        visited.insert(task);
        order.push(task);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(graph: &StepTaskGraph, task: StepTask) -> usize {
        graph
            .execution_order()
            .iter()
            .position(|&t| t == task)
            .expect("task scheduled")
    }

    #[test]
    fn test_full_step_order() {
        let graph = StepTaskGraph::for_step(true, true).expect("graph");
        assert_eq!(graph.len(), 9);
        assert_eq!(graph.execution_order()[0], StepTask::SyncIn);
        assert!(position(&graph, StepTask::Broadphase) < position(&graph, StepTask::Narrowphase));
        assert!(position(&graph, StepTask::SolverPrep) < position(&graph, StepTask::SolverSolve));
        assert!(
            position(&graph, StepTask::CopyInputVelocities) < position(&graph, StepTask::SolverSolve)
        );
        assert!(position(&graph, StepTask::VisualDebugger) < position(&graph, StepTask::ExtractMotions));
        assert_eq!(graph.execution_order().last(), Some(&StepTask::ExtractMotions));
    }

    #[test]
    fn test_early_exit_shapes() {
        let graph = StepTaskGraph::for_step(false, false).expect("graph");
        assert_eq!(graph.execution_order(), &[StepTask::SyncIn]);

        let graph = StepTaskGraph::for_step(false, true).expect("graph");
        assert_eq!(
            graph.execution_order(),
            &[StepTask::SyncIn, StepTask::VisualDebugger]
        );
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = StepTaskGraph::new();
        graph
            .register(StepTask::Broadphase, &[StepTask::Narrowphase])
            .expect_err("narrowphase not registered yet");

        let mut graph = StepTaskGraph::new();
        graph.register(StepTask::SyncIn, &[]).expect("sync in");
        graph.register(StepTask::Broadphase, &[StepTask::SyncIn]).expect("broadphase");
        let result = graph.register(StepTask::SyncIn, &[StepTask::Broadphase]);
        assert!(result.is_err());
        assert!(graph.dependencies(StepTask::SyncIn).is_empty());
        assert_eq!(graph.execution_order(), &[StepTask::SyncIn, StepTask::Broadphase]);
    }
}
