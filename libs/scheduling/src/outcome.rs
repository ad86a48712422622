//! Bug reports and execution outcomes

use crate::trace::ExecutionTrace;
use serde::{Deserialize, Serialize};
use std::fmt;
use types::ActorId;

/// Category of a reported bug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugKind {
    /// An explicit assertion in a machine, monitor or the test failed
    AssertionViolation,
    /// No state on the stack could handle a delivered event
    UnhandledEvent,
    /// Entry, exit or action code returned an error or panicked
    ActionFault,
    /// No operation is enabled but some wait on a rendezvous
    Deadlock,
    /// The identity counter is exhausted
    Overflow,
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A bug found during a run
///
/// The trace is filled in by the controller when the run terminates, so it
/// always contains every decision up to the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub kind: BugKind,
    pub message: String,
    pub actor: Option<ActorId>,
    pub trace: ExecutionTrace,
}

impl BugReport {
    pub fn new(kind: BugKind, message: impl Into<String>, actor: Option<ActorId>) -> Self {
        Self {
            kind,
            message: message.into(),
            actor,
            trace: ExecutionTrace::new(),
        }
    }

    pub fn assertion(message: impl Into<String>, actor: Option<ActorId>) -> Self {
        Self::new(BugKind::AssertionViolation, message, actor)
    }

    /// Same kind and message, ignoring the trace
    pub fn same_verdict(&self, other: &BugReport) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(actor) = &self.actor {
            write!(f, " (in {})", actor)?;
        }
        Ok(())
    }
}

/// How one run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// No operation enabled and none blocked
    Quiescent,
    /// `max_steps` decisions were taken
    BoundReached,
    BugFound(BugReport),
    /// A replayed trace did not match the program
    Diverged(String),
    /// The runtime was shut down explicitly
    Stopped,
}

impl ExecutionOutcome {
    pub fn is_bug(&self) -> bool {
        matches!(self, ExecutionOutcome::BugFound(_))
    }

    pub fn bug(&self) -> Option<&BugReport> {
        match self {
            ExecutionOutcome::BugFound(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Quiescent => f.write_str("quiescent"),
            ExecutionOutcome::BoundReached => f.write_str("step bound reached"),
            ExecutionOutcome::BugFound(report) => write!(f, "bug found: {}", report),
            ExecutionOutcome::Diverged(reason) => write!(f, "diverged: {}", reason),
            ExecutionOutcome::Stopped => f.write_str("stopped"),
        }
    }
}
