//! # Scheduling Control
//!
//! Every nondeterministic decision a running program makes passes through the
//! [`SchedulingController`]: which actor runs after a send, a creation, a halt
//! or a rendezvous, and the value of every random boolean or integer.
//!
//! ## Modes
//!
//! - **Production**: scheduling points return immediately and actor threads run
//!   freely. The controller only tracks which operations have work so that
//!   idle threads can park and callers can wait for quiescence.
//! - **Exploration**: exactly one operation holds the turn. At each point the
//!   controller asks an [`ExplorationStrategy`] which enabled operation runs
//!   next and records the decision in an [`ExecutionTrace`].
//!
//! ## Termination
//!
//! An exploration ends on quiescence, on deadlock (no operation enabled but
//! some blocked on a rendezvous), when `max_steps` decisions were taken, on the
//! first [`BugReport`], or when a replayed trace diverges. Every thread waiting
//! on the controller then wakes up with [`Canceled`].
//!
//! ```text
//!   driver (op 0)         actor A (op 1)         actor B (op 2)
//!   ─────────────         ──────────────         ──────────────
//!   create(A) ──Create──▶ [waits for turn]
//!   send(A, Ping) ─Send─▶ runs, sends to B ─Send─▶ [waits]
//!   [done] ──Yield──▶     goes idle ──Yield──▶    runs
//! ```

pub mod controller;
pub mod errors;
pub mod outcome;
pub mod point;
pub mod strategy;
pub mod trace;

pub use controller::{
    current_operation, set_current_operation, OperationId, OperationStatus,
    SchedulingController, DRIVER_OPERATION,
};
pub use errors::{Canceled, Divergence, TraceError};
pub use outcome::{BugKind, BugReport, ExecutionOutcome};
pub use point::SchedulingPointKind;
pub use strategy::{
    ExplorationStrategy, PctStrategy, RandomStrategy, ReplayStrategy,
};
pub use trace::{ExecutionTrace, TraceStep};
