use super::ExplorationStrategy;
use crate::controller::OperationId;
use crate::errors::Divergence;
use crate::point::SchedulingPointKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniformly random choice among enabled operations
#[derive(Debug)]
pub struct RandomStrategy {
    seed: u64,
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl ExplorationStrategy for RandomStrategy {
    fn prepare_iteration(&mut self, _iteration: u32) -> bool {
        true
    }

    fn next_operation(
        &mut self,
        _kind: SchedulingPointKind,
        _current: OperationId,
        enabled: &[OperationId],
    ) -> Result<OperationId, Divergence> {
        let index = self.rng.gen_range(0..enabled.len());
        Ok(enabled[index])
    }

    fn next_bool(&mut self) -> Result<bool, Divergence> {
        Ok(self.rng.gen())
    }

    fn next_int(&mut self, max: u64) -> Result<u64, Divergence> {
        if max == 0 {
            return Ok(0);
        }
        Ok(self.rng.gen_range(0..max))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
