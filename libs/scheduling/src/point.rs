//! Scheduling point kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// The reason a scheduling decision is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingPointKind {
    Create,
    Send,
    Halt,
    Rendezvous,
    NonDeterministicBool,
    NonDeterministicInt,
    /// An operation went idle or finished its work
    Yield,
    /// A synthetic `Default` event is about to be handled
    DefaultEvent,
    /// A mock shared object is about to be accessed
    SharedAccess,
}

impl SchedulingPointKind {
    /// True for the kinds that record a value rather than an operation
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            SchedulingPointKind::NonDeterministicBool | SchedulingPointKind::NonDeterministicInt
        )
    }
}

impl fmt::Display for SchedulingPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
