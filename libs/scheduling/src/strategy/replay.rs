use super::ExplorationStrategy;
use crate::controller::OperationId;
use crate::errors::Divergence;
use crate::point::SchedulingPointKind;
use crate::trace::{ExecutionTrace, TraceStep};

/// Feeds a recorded trace back into the controller
///
/// Runs a single iteration. Any mismatch between the recorded kind and the
/// requested one, a recorded operation that is not enabled, or a program that
/// asks for more decisions than were recorded is a divergence.
#[derive(Debug)]
pub struct ReplayStrategy {
    trace: ExecutionTrace,
    position: usize,
}

impl ReplayStrategy {
    pub fn new(trace: ExecutionTrace) -> Self {
        Self { trace, position: 0 }
    }

    /// Decisions consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, kind: SchedulingPointKind) -> Result<TraceStep, Divergence> {
        let step = *self.trace.get(self.position).ok_or_else(|| {
            Divergence::new(
                self.position,
                format!("trace has {} steps, program asked for more", self.trace.len()),
            )
        })?;

        if step.kind != kind {
            return Err(Divergence::new(
                self.position,
                format!("recorded {} but program reached {}", step.kind, kind),
            ));
        }

        self.position += 1;
        Ok(step)
    }
}

impl ExplorationStrategy for ReplayStrategy {
    fn prepare_iteration(&mut self, iteration: u32) -> bool {
        self.position = 0;
        iteration == 0
    }

    fn next_operation(
        &mut self,
        kind: SchedulingPointKind,
        _current: OperationId,
        enabled: &[OperationId],
    ) -> Result<OperationId, Divergence> {
        let at = self.position;
        let step = self.take(kind)?;
        if enabled.binary_search(&step.chosen).is_err() {
            return Err(Divergence::new(
                at,
                format!("recorded operation {} is not enabled", step.chosen),
            ));
        }
        Ok(step.chosen)
    }

    fn next_bool(&mut self) -> Result<bool, Divergence> {
        Ok(self.take(SchedulingPointKind::NonDeterministicBool)?.chosen != 0)
    }

    fn next_int(&mut self, max: u64) -> Result<u64, Divergence> {
        let at = self.position;
        let value = self.take(SchedulingPointKind::NonDeterministicInt)?.chosen;
        if max > 0 && value >= max {
            return Err(Divergence::new(
                at,
                format!("recorded value {} is out of range 0..{}", value, max),
            ));
        }
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
