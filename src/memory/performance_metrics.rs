//! Step metrics - wall clock timing of executed phases

use std::time::{Duration, Instant};

/// Elapsed time of one executed phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTiming {
    pub name: &'static str,
    pub duration: Duration,
}

/// Timings collected while a step runs
#[derive(Debug, Default)]
pub struct StepMetrics {
    timings: Vec<PhaseTiming>,
    current: Option<(&'static str, Instant)>,
}

impl StepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.current = None;
    }

    /// Start timing `name`, closing any measurement still open
    pub fn start_measurement(&mut self, name: &'static str) {
        self.end_measurement();
        self.current = Some((name, Instant::now()));
    }

    pub fn end_measurement(&mut self) {
        if let Some((name, started)) = self.current.take() {
            self.timings.push(PhaseTiming {
                name,
                duration: started.elapsed(),
            });
        }
    }

    pub fn timings(&self) -> &[PhaseTiming] {
        &self.timings
    }

    pub fn total(&self) -> Duration {
        self.timings.iter().map(|t| t.duration).sum()
    }

    /// Closed timings, leaving the collector empty
    pub fn take_timings(&mut self) -> Vec<PhaseTiming> {
        self.end_measurement();
        std::mem::take(&mut self.timings)
    }
}
