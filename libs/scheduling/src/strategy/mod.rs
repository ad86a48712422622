//! Exploration strategies
//!
//! A strategy answers the controller's questions: which enabled operation runs
//! next, and what a nondeterministic boolean or integer evaluates to. The same
//! strategy instance is kept across the iterations of one engine run, so a
//! seeded strategy explores a different but reproducible schedule each time.

mod pct;
mod random;
mod replay;

pub use pct::PctStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

use crate::controller::OperationId;
use crate::errors::Divergence;
use crate::point::SchedulingPointKind;

/// Decision source for exploration mode
pub trait ExplorationStrategy: Send {
    /// Called before each iteration. Returning `false` ends the exploration.
    fn prepare_iteration(&mut self, iteration: u32) -> bool;

    /// Pick the next operation among `enabled`, which is sorted and non-empty
    fn next_operation(
        &mut self,
        kind: SchedulingPointKind,
        current: OperationId,
        enabled: &[OperationId],
    ) -> Result<OperationId, Divergence>;

    fn next_bool(&mut self) -> Result<bool, Divergence>;

    /// Pick a value in `0..max`; `max == 0` always yields 0
    fn next_int(&mut self, max: u64) -> Result<u64, Divergence>;

    fn name(&self) -> &'static str;
}
