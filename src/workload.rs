//! Generators of service workload bursts.

use dyn_clone::{clone_trait_object, DynClone};
use rand::rngs::StdRng;

/// One workload step: arrivals at `rate` for `duration` simulated seconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Burst {
    pub duration: f64,
    pub rate: f64,
}

/// Produces the next workload burst of a service. Generators are cloned at
/// the start of each replication so every replication replays from the
/// initial state; randomized generators draw from the replication rng.
pub trait WorkloadGenerator: DynClone {
    fn next_burst(&mut self, rng: &mut StdRng) -> Burst;
}

clone_trait_object!(WorkloadGenerator);

/// Cycles through a fixed list of (duration, rate) steps.
#[derive(Clone)]
pub struct MultistepWorkloadGenerator {
    steps: Vec<Burst>,
    next_idx: usize,
}

impl MultistepWorkloadGenerator {
    /// Panics on an empty step list.
    pub fn new(steps: Vec<Burst>) -> Self {
        assert!(!steps.is_empty(), "workload needs at least one step");
        Self { steps, next_idx: 0 }
    }
}

impl WorkloadGenerator for MultistepWorkloadGenerator {
    fn next_burst(&mut self, _rng: &mut StdRng) -> Burst {
        let burst = self.steps[self.next_idx];
        self.next_idx = (self.next_idx + 1) % self.steps.len();
        burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn multistep_cycles_through_steps() {
        let mut rng = StdRng::seed_from_u64(1);
        let steps = vec![
            Burst { duration: 10.0, rate: 1.0 },
            Burst { duration: 5.0, rate: 4.0 },
        ];
        let mut gen = MultistepWorkloadGenerator::new(steps.clone());
        assert_eq!(gen.next_burst(&mut rng), steps[0]);
        assert_eq!(gen.next_burst(&mut rng), steps[1]);
        assert_eq!(gen.next_burst(&mut rng), steps[0]);
    }

    #[test]
    fn clone_restarts_from_initial_state() {
        let mut rng = StdRng::seed_from_u64(1);
        let steps = vec![
            Burst { duration: 10.0, rate: 1.0 },
            Burst { duration: 5.0, rate: 4.0 },
        ];
        let template: Box<dyn WorkloadGenerator> =
            Box::new(MultistepWorkloadGenerator::new(steps.clone()));

        let mut first = template.clone();
        first.next_burst(&mut rng);
        first.next_burst(&mut rng);

        let mut second = template.clone();
        assert_eq!(second.next_burst(&mut rng), steps[0]);
    }
}
