//! Lifecycle hooks for external tooling (race detectors, coverage, tracing)

use parking_lot::Mutex;
use types::ActorId;

/// Notified when actors are created and destroyed
///
/// Callbacks run on the thread that created or halted the actor, inside its
/// scheduling turn. They must not call back into the runtime.
pub trait LifecycleObserver: Send + Sync {
    fn on_actor_created(&self, _id: &ActorId) {}

    fn on_actor_destroyed(&self, _id: &ActorId) {}
}

/// Lifecycle event captured by [`LifecycleRecorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created(ActorId),
    Destroyed(ActorId),
}

/// Observer that records every notification in order
#[derive(Debug, Default)]
pub struct LifecycleRecorder {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl LifecycleRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn created(&self) -> Vec<ActorId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::Created(id) => Some(id.clone()),
                LifecycleEvent::Destroyed(_) => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<ActorId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::Destroyed(id) => Some(id.clone()),
                LifecycleEvent::Created(_) => None,
            })
            .collect()
    }
}

impl LifecycleObserver for LifecycleRecorder {
    fn on_actor_created(&self, id: &ActorId) {
        self.events.lock().push(LifecycleEvent::Created(id.clone()));
    }

    fn on_actor_destroyed(&self, id: &ActorId) {
        self.events.lock().push(LifecycleEvent::Destroyed(id.clone()));
    }
}
