//! Error types for descriptor construction and runtime operations

use scheduling::Canceled;
use thiserror::Error;
use types::{ActorId, IdentityError};

/// A machine or monitor descriptor is malformed
///
/// Raised when a descriptor or registry is built, never while actors run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Actor '{actor}' declares no states")]
    NoStatesDeclared { actor: String },

    #[error("Actor '{actor}' must declare an initial state")]
    NoInitialState { actor: String },

    #[error("Actor '{actor}' can not have more than one initial state: {states:?}")]
    MultipleInitialStates { actor: String, states: Vec<String> },

    #[error("Actor '{actor}' declares state '{state}' more than once")]
    DuplicateState { actor: String, state: String },

    #[error("State '{state}' of actor '{actor}' targets unknown state '{target}'")]
    UnknownTargetState {
        actor: String,
        state: String,
        target: String,
    },

    #[error("State '{state}' of actor '{actor}' extends unknown state '{base}'")]
    UnknownBaseState {
        actor: String,
        state: String,
        base: String,
    },

    #[error("State '{state}' of actor '{actor}' is part of a cyclic extends chain")]
    CyclicBaseState { actor: String, state: String },

    #[error("State '{state}' of actor '{actor}' declares more than one handler for event '{event}'")]
    ConflictingHandlers {
        actor: String,
        state: String,
        event: String,
    },

    #[error("Monitor '{monitor}' declares a push transition in state '{state}'")]
    PushInMonitor { monitor: String, state: String },

    #[error("Actor type '{type_tag}' is registered more than once")]
    DuplicateType { type_tag: String },
}

impl ConfigurationError {
    pub fn conflicting(actor: &str, state: &str, event: &str) -> Self {
        Self::ConflictingHandlers {
            actor: actor.to_string(),
            state: state.to_string(),
            event: event.to_string(),
        }
    }

    pub fn duplicate_state(actor: &str, state: &str) -> Self {
        Self::DuplicateState {
            actor: actor.to_string(),
            state: state.to_string(),
        }
    }
}

/// Errors returned by runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Unknown actor type '{0}'")]
    UnknownActorType(String),

    #[error("Unknown monitor '{0}'")]
    UnknownMonitor(String),

    #[error("Unknown actor '{0}'")]
    UnknownActor(ActorId),

    /// An assertion failed and has been reported
    #[error("Assertion failure: {0}")]
    AssertionFailure(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The run terminated; the caller should unwind
    #[error("Execution canceled")]
    ExecutionCanceled,
}

impl RuntimeError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// True for errors that signal an already reported bug or a terminated run
    pub fn is_termination(&self) -> bool {
        matches!(
            self,
            RuntimeError::ExecutionCanceled | RuntimeError::AssertionFailure(_)
        )
    }
}

impl From<Canceled> for RuntimeError {
    fn from(_: Canceled) -> Self {
        RuntimeError::ExecutionCanceled
    }
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
