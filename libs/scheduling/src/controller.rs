//! Scheduling Controller
//!
//! Arbiter of every nondeterministic decision. Operations (the test driver and
//! one per actor) register with the controller and report every scheduling
//! point they reach.
//!
//! # Exploration mode
//!
//! A single turn token lives in the controller state. [`schedule`] computes
//! the enabled operations, asks the strategy, records the decision, hands the
//! token to the chosen operation and parks the caller until the token comes
//! back. Operations block on the same `Condvar`.
//!
//! # Production mode
//!
//! Scheduling points return immediately. The controller still tracks which
//! operations have work: an idle actor thread parks in `schedule(.., Yield)`
//! until a send enables it again.
//!
//! # Lock Ordering
//!
//! Callers may hold an actor's mailbox lock while calling [`enable`] or
//! [`disable`]. The controller never takes a mailbox lock.
//!
//! [`schedule`]: SchedulingController::schedule
//! [`enable`]: SchedulingController::enable
//! [`disable`]: SchedulingController::disable

use crate::errors::{Canceled, Divergence};
use crate::outcome::{BugKind, BugReport, ExecutionOutcome};
use crate::point::SchedulingPointKind;
use crate::strategy::ExplorationStrategy;
use crate::trace::ExecutionTrace;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rand::Rng;
use runtime_config::SchedulingMode;
use std::cell::Cell;
use std::collections::BTreeMap;
use tracing::{debug, error, info, trace};

/// Controller handle for a schedulable thread of control
pub type OperationId = u64;

/// The test driver is always operation 0
pub const DRIVER_OPERATION: OperationId = 0;

thread_local! {
    static CURRENT_OPERATION: Cell<Option<OperationId>> = const { Cell::new(None) };
}

/// Operation bound to the calling thread, if any
pub fn current_operation() -> Option<OperationId> {
    CURRENT_OPERATION.with(|current| current.get())
}

/// Bind the calling thread to `op`
pub fn set_current_operation(op: Option<OperationId>) {
    CURRENT_OPERATION.with(|current| current.set(op));
}

/// Scheduling status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Has work and may be chosen
    Enabled,
    /// Idle until something enables it
    Disabled,
    /// Waiting for a rendezvous reply
    Blocked,
    Completed,
}

#[derive(Debug)]
struct Operation {
    name: String,
    status: OperationStatus,
}

struct ControllerState {
    operations: BTreeMap<OperationId, Operation>,
    next_operation: OperationId,
    scheduled: OperationId,
    steps: u64,
    trace: ExecutionTrace,
    outcome: Option<ExecutionOutcome>,
    strategy: Option<Box<dyn ExplorationStrategy>>,
}

impl ControllerState {
    fn status(&self, op: OperationId) -> Option<OperationStatus> {
        self.operations.get(&op).map(|operation| operation.status)
    }

    fn set_status(&mut self, op: OperationId, from: &[OperationStatus], to: OperationStatus) {
        if let Some(operation) = self.operations.get_mut(&op) {
            if from.contains(&operation.status) {
                operation.status = to;
            }
        }
    }

    fn with_status(&self, status: OperationStatus) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|(_, operation)| operation.status == status)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Arbiter of scheduling decisions for one run
pub struct SchedulingController {
    mode: SchedulingMode,
    max_steps: u64,
    state: Mutex<ControllerState>,
    changed: Condvar,
}

impl SchedulingController {
    /// Controller that lets operations run freely
    pub fn production() -> Self {
        Self::with_mode(SchedulingMode::Production, u64::MAX, None)
    }

    /// Controller driven by `strategy`. Registers the test driver as
    /// operation 0 holding the turn.
    pub fn exploration(strategy: Box<dyn ExplorationStrategy>, max_steps: u64) -> Self {
        info!(
            strategy = strategy.name(),
            max_steps,
            "Creating exploration controller"
        );
        let controller = Self::with_mode(SchedulingMode::Exploration, max_steps, Some(strategy));
        controller.state.lock().operations.insert(
            DRIVER_OPERATION,
            Operation {
                name: "test driver".to_string(),
                status: OperationStatus::Enabled,
            },
        );
        controller
    }

    fn with_mode(
        mode: SchedulingMode,
        max_steps: u64,
        strategy: Option<Box<dyn ExplorationStrategy>>,
    ) -> Self {
        Self {
            mode,
            max_steps,
            state: Mutex::new(ControllerState {
                operations: BTreeMap::new(),
                next_operation: DRIVER_OPERATION + 1,
                scheduled: DRIVER_OPERATION,
                steps: 0,
                trace: ExecutionTrace::new(),
                outcome: None,
                strategy,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }

    pub fn is_exploration(&self) -> bool {
        self.mode == SchedulingMode::Exploration
    }

    /// Register a new enabled operation. Ids are handed out in call order.
    pub fn register_operation(&self, name: impl Into<String>) -> OperationId {
        let mut state = self.state.lock();
        let op = state.next_operation;
        state.next_operation += 1;
        let name = name.into();
        trace!(op, name = %name, "Registered operation");
        state.operations.insert(
            op,
            Operation {
                name,
                status: OperationStatus::Enabled,
            },
        );
        op
    }

    pub fn status(&self, op: OperationId) -> Option<OperationStatus> {
        self.state.lock().status(op)
    }

    /// The operation has work again
    pub fn enable(&self, op: OperationId) {
        let mut state = self.state.lock();
        state.set_status(op, &[OperationStatus::Disabled], OperationStatus::Enabled);
        self.changed.notify_all();
    }

    /// The operation went idle
    pub fn disable(&self, op: OperationId) {
        let mut state = self.state.lock();
        state.set_status(op, &[OperationStatus::Enabled], OperationStatus::Disabled);
        self.changed.notify_all();
    }

    /// The operation waits for a rendezvous reply
    pub fn block(&self, op: OperationId) {
        let mut state = self.state.lock();
        state.set_status(op, &[OperationStatus::Enabled], OperationStatus::Blocked);
        self.changed.notify_all();
    }

    /// The rendezvous reply arrived
    pub fn unblock(&self, op: OperationId) {
        let mut state = self.state.lock();
        state.set_status(op, &[OperationStatus::Blocked], OperationStatus::Enabled);
        self.changed.notify_all();
    }

    /// Park until `op` holds the turn. Used once by a freshly spawned operation.
    pub fn wait_for_turn(&self, op: OperationId) -> Result<(), Canceled> {
        let mut state = self.state.lock();
        if self.is_exploration() {
            while state.outcome.is_none() && state.scheduled != op {
                self.changed.wait(&mut state);
            }
        }
        if state.outcome.is_some() {
            return Err(Canceled);
        }
        Ok(())
    }

    /// Pass a scheduling point of `kind` on behalf of `current`
    ///
    /// In exploration mode this may hand the turn to another operation and
    /// returns once `current` is scheduled again. Returns `Canceled` once the
    /// run has terminated.
    pub fn schedule(&self, current: OperationId, kind: SchedulingPointKind) -> Result<(), Canceled> {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return Err(Canceled);
        }

        if !self.is_exploration() {
            while state.outcome.is_none() && state.status(current) == Some(OperationStatus::Disabled) {
                self.changed.wait(&mut state);
            }
            return if state.outcome.is_some() { Err(Canceled) } else { Ok(()) };
        }

        if state.status(current).is_none() {
            return Ok(());
        }

        self.advance(&mut state, current, kind);
        while state.outcome.is_none() && state.scheduled != current {
            self.changed.wait(&mut state);
        }

        if state.outcome.is_some() {
            return Err(Canceled);
        }
        Ok(())
    }

    /// `op` finished. If it held the turn, the next operation is chosen
    /// without waiting.
    pub fn complete(&self, op: OperationId, kind: SchedulingPointKind) {
        let mut state = self.state.lock();
        state.set_status(
            op,
            &[
                OperationStatus::Enabled,
                OperationStatus::Disabled,
                OperationStatus::Blocked,
            ],
            OperationStatus::Completed,
        );
        debug!(op, kind = %kind, "Operation completed");

        if self.is_exploration() && state.outcome.is_none() && state.scheduled == op {
            self.advance(&mut state, op, kind);
        }
        self.changed.notify_all();
    }

    fn advance(
        &self,
        state: &mut MutexGuard<'_, ControllerState>,
        current: OperationId,
        kind: SchedulingPointKind,
    ) {
        let enabled = state.with_status(OperationStatus::Enabled);
        if enabled.is_empty() {
            let blocked = state.with_status(OperationStatus::Blocked);
            if blocked.is_empty() {
                self.finish(state, ExecutionOutcome::Quiescent);
            } else {
                let names: Vec<&str> = blocked
                    .iter()
                    .filter_map(|op| state.operations.get(op))
                    .map(|operation| operation.name.as_str())
                    .collect();
                let message = format!(
                    "Deadlock detected. {} waiting for a rendezvous reply and no other operation is enabled.",
                    names.join(", ")
                );
                self.finish(
                    state,
                    ExecutionOutcome::BugFound(BugReport::new(BugKind::Deadlock, message, None)),
                );
            }
            return;
        }

        state.steps += 1;
        if state.steps > self.max_steps {
            self.finish(state, ExecutionOutcome::BoundReached);
            return;
        }

        let step = state.trace.len();
        let choice = match state.strategy.as_mut() {
            Some(strategy) => strategy.next_operation(kind, current, &enabled),
            None => Ok(enabled[0]),
        };

        match choice {
            Ok(chosen) if enabled.binary_search(&chosen).is_ok() => {
                trace!(kind = %kind, current, chosen, step, "Scheduling decision");
                state.trace.push(kind, chosen);
                state.scheduled = chosen;
            }
            Ok(chosen) => {
                let divergence = Divergence::new(step, format!("operation {} is not enabled", chosen));
                self.finish(state, ExecutionOutcome::Diverged(divergence.to_string()));
            }
            Err(divergence) => {
                self.finish(state, ExecutionOutcome::Diverged(divergence.to_string()));
            }
        }
        self.changed.notify_all();
    }

    /// Stop the run with `outcome`. The first outcome wins.
    fn finish(&self, state: &mut MutexGuard<'_, ControllerState>, outcome: ExecutionOutcome) {
        if state.outcome.is_some() {
            return;
        }

        let outcome = match outcome {
            ExecutionOutcome::BugFound(mut report) => {
                report.trace = state.trace.clone();
                error!(kind = %report.kind, steps = state.steps, "{}", report.message);
                ExecutionOutcome::BugFound(report)
            }
            other => {
                debug!(steps = state.steps, outcome = %other, "Run terminated");
                other
            }
        };

        state.outcome = Some(outcome);
        self.changed.notify_all();
    }

    fn choice(
        &self,
        kind: SchedulingPointKind,
        pick: impl FnOnce(&mut dyn ExplorationStrategy) -> Result<u64, Divergence>,
    ) -> Result<u64, Canceled> {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return Err(Canceled);
        }

        state.steps += 1;
        if state.steps > self.max_steps {
            self.finish(&mut state, ExecutionOutcome::BoundReached);
            return Err(Canceled);
        }

        let step = state.trace.len();
        let picked = match state.strategy.as_mut() {
            Some(strategy) => pick(&mut **strategy),
            None => Err(Divergence::new(step, "no strategy installed")),
        };

        match picked {
            Ok(value) => {
                trace!(kind = %kind, value, step, "Nondeterministic choice");
                state.trace.push(kind, value);
                Ok(value)
            }
            Err(divergence) => {
                self.finish(&mut state, ExecutionOutcome::Diverged(divergence.to_string()));
                Err(Canceled)
            }
        }
    }

    /// Nondeterministic boolean, recorded in exploration mode
    pub fn next_bool(&self) -> Result<bool, Canceled> {
        if !self.is_exploration() {
            if self.is_terminated() {
                return Err(Canceled);
            }
            return Ok(rand::thread_rng().gen());
        }
        self.choice(SchedulingPointKind::NonDeterministicBool, |strategy| {
            strategy.next_bool().map(u64::from)
        })
        .map(|value| value != 0)
    }

    /// Nondeterministic integer in `0..max`, recorded in exploration mode
    pub fn next_int(&self, max: u64) -> Result<u64, Canceled> {
        if !self.is_exploration() {
            if self.is_terminated() {
                return Err(Canceled);
            }
            if max == 0 {
                return Ok(0);
            }
            return Ok(rand::thread_rng().gen_range(0..max));
        }
        self.choice(SchedulingPointKind::NonDeterministicInt, |strategy| {
            strategy.next_int(max)
        })
    }

    /// File a bug and terminate the run. Returns `false` if the run had
    /// already terminated.
    pub fn report_bug(&self, report: BugReport) -> bool {
        self.terminate(ExecutionOutcome::BugFound(report))
    }

    /// Terminate the run with `outcome`. Returns `false` if it had already
    /// terminated.
    pub fn terminate(&self, outcome: ExecutionOutcome) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return false;
        }
        self.finish(&mut state, outcome);
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        self.state.lock().outcome.clone()
    }

    /// Block until the run terminated
    pub fn wait_for_outcome(&self) -> ExecutionOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.changed.wait(&mut state);
        }
    }

    /// Block until no operation is enabled (production mode)
    pub fn wait_for_quiescence(&self) -> Result<(), Canceled> {
        let mut state = self.state.lock();
        loop {
            if state.outcome.is_some() {
                return Err(Canceled);
            }
            if state.with_status(OperationStatus::Enabled).is_empty() {
                return Ok(());
            }
            self.changed.wait(&mut state);
        }
    }

    pub fn trace(&self) -> ExecutionTrace {
        self.state.lock().trace.clone()
    }

    pub fn steps(&self) -> u64 {
        self.state.lock().steps
    }

    /// Hand the strategy back so it can drive the next iteration
    pub fn take_strategy(&self) -> Option<Box<dyn ExplorationStrategy>> {
        self.state.lock().strategy.take()
    }
}

impl std::fmt::Debug for SchedulingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SchedulingController")
            .field("mode", &self.mode)
            .field("operations", &state.operations)
            .field("scheduled", &state.scheduled)
            .field("steps", &state.steps)
            .field("outcome", &state.outcome)
            .finish()
    }
}
