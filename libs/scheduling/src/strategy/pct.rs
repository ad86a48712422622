//! Probabilistic concurrency testing
//!
//! Each operation gets a random priority when it is first seen, and the
//! highest-priority enabled operation always runs. At `change_points` randomly
//! chosen steps the running operation is demoted to the lowest priority. Bugs
//! of depth `d` are found with probability at least `1 / (n * k^(d-1))`.
//!
//! The step positions are drawn from the longest schedule seen so far, so the
//! first iteration runs without priority changes.

use super::ExplorationStrategy;
use crate::controller::OperationId;
use crate::errors::Divergence;
use crate::point::SchedulingPointKind;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct PctStrategy {
    seed: u64,
    rng: StdRng,
    change_point_count: u32,

    /// Highest priority first
    priorities: Vec<OperationId>,
    change_points: BTreeSet<u64>,
    step: u64,
    schedule_length: u64,
}

impl PctStrategy {
    pub fn new(seed: u64, change_points: u32) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            change_point_count: change_points,
            priorities: Vec::new(),
            change_points: BTreeSet::new(),
            step: 0,
            schedule_length: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn place_new_operations(&mut self, enabled: &[OperationId]) {
        for op in enabled {
            if !self.priorities.contains(op) {
                let position = self.rng.gen_range(0..=self.priorities.len());
                self.priorities.insert(position, *op);
            }
        }
    }

    fn highest_enabled(&self, enabled: &[OperationId]) -> Option<OperationId> {
        self.priorities
            .iter()
            .copied()
            .find(|op| enabled.binary_search(op).is_ok())
    }
}

impl ExplorationStrategy for PctStrategy {
    fn prepare_iteration(&mut self, _iteration: u32) -> bool {
        self.schedule_length = self.schedule_length.max(self.step);
        self.priorities.clear();
        self.change_points.clear();
        self.step = 0;

        let count = (self.change_point_count as u64).min(self.schedule_length) as usize;
        if count > 0 {
            let positions = index::sample(&mut self.rng, self.schedule_length as usize, count);
            for position in positions.iter() {
                self.change_points.insert(position as u64 + 1);
            }
        }
        true
    }

    fn next_operation(
        &mut self,
        _kind: SchedulingPointKind,
        _current: OperationId,
        enabled: &[OperationId],
    ) -> Result<OperationId, Divergence> {
        self.step += 1;
        self.place_new_operations(enabled);

        if self.change_points.contains(&self.step) {
            if let Some(top) = self.highest_enabled(enabled) {
                self.priorities.retain(|op| *op != top);
                self.priorities.push(top);
            }
        }

        self.highest_enabled(enabled)
            .ok_or_else(|| Divergence::new(self.step as usize, "no prioritized operation is enabled"))
    }

    fn next_bool(&mut self) -> Result<bool, Divergence> {
        self.step += 1;
        Ok(self.rng.gen())
    }

    fn next_int(&mut self, max: u64) -> Result<u64, Divergence> {
        self.step += 1;
        if max == 0 {
            return Ok(0);
        }
        Ok(self.rng.gen_range(0..max))
    }

    fn name(&self) -> &'static str {
        "pct"
    }
}
