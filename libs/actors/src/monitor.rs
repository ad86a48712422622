//! Monitor Registry
//!
//! Monitors are specification machines evaluated synchronously on the
//! sender's turn. Each runtime keeps its monitors in registration order and
//! forwards every sent event to the monitors subscribed to its type before it
//! is enqueued.
//!
//! # Lock Ordering
//!
//! 1. `monitors` (held for registration, released before delivery)
//! 2. one entry's `core`
//!
//! A monitor core lock may be held while calling into the controller.

use crate::descriptor::ActorDescriptor;
use crate::errors::{Result, RuntimeError};
use crate::machine::StateMachineCore;
use crate::runtime::ActorRuntime;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use types::{ActorId, Event, EventType};

struct MonitorEntry {
    type_tag: String,
    subscriptions: HashSet<EventType>,
    core: Mutex<StateMachineCore>,
}

#[derive(Default)]
pub(crate) struct MonitorRegistry {
    monitors: RwLock<Vec<Arc<MonitorEntry>>>,
}

impl MonitorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Instantiate `descriptor` as monitor `id` and run its initial entry action
    pub(crate) fn register(
        &self,
        rt: &ActorRuntime,
        id: ActorId,
        descriptor: Arc<ActorDescriptor>,
    ) -> Result<()> {
        let type_tag = descriptor.type_tag().to_string();
        let mut monitors = self.monitors.write();
        if monitors.iter().any(|entry| entry.type_tag == type_tag) {
            return Err(RuntimeError::invalid_operation(format!(
                "Monitor '{}' is already registered",
                type_tag
            )));
        }

        let subscriptions = descriptor.subscriptions();
        let mut core = StateMachineCore::monitor(id, descriptor);
        core.start_monitor(rt)?;

        info!(monitor = %type_tag, subscriptions = subscriptions.len(), "Registered monitor");
        monitors.push(Arc::new(MonitorEntry {
            type_tag,
            subscriptions,
            core: Mutex::new(core),
        }));
        Ok(())
    }

    fn find(&self, type_tag: &str) -> Option<Arc<MonitorEntry>> {
        self.monitors
            .read()
            .iter()
            .find(|entry| entry.type_tag == type_tag)
            .cloned()
    }

    /// Deliver `event` to every monitor subscribed to its type
    pub(crate) fn forward(&self, rt: &ActorRuntime, event: &Event) -> Result<()> {
        let subscribed: Vec<Arc<MonitorEntry>> = self
            .monitors
            .read()
            .iter()
            .filter(|entry| entry.subscriptions.contains(event.event_type()))
            .cloned()
            .collect();

        for entry in subscribed {
            entry.core.lock().deliver(rt, event.clone())?;
        }
        Ok(())
    }

    /// Deliver `event` to the monitor registered as `type_tag`
    pub(crate) fn deliver_to(&self, rt: &ActorRuntime, type_tag: &str, event: Event) -> Result<()> {
        let entry = self
            .find(type_tag)
            .ok_or_else(|| RuntimeError::UnknownMonitor(type_tag.to_string()))?;
        let mut core = entry.core.lock();
        core.deliver(rt, event)
    }

    /// Current state of the monitor registered as `type_tag`
    pub(crate) fn state_of(&self, type_tag: &str) -> Option<String> {
        let entry = self.find(type_tag)?;
        let core = entry.core.lock();
        core.current_state().map(str::to_string)
    }

    pub(crate) fn registered(&self) -> Vec<String> {
        self.monitors
            .read()
            .iter()
            .map(|entry| entry.type_tag.clone())
            .collect()
    }
}
