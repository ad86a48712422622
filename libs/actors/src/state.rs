//! Active states on an actor's state stack

use crate::descriptor::{ErasedAction, GotoTransition, StateDescriptor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use types::EventType;

/// A state instantiated on the stack
///
/// Goto and push bindings come from the state's own descriptor only. Action
/// bindings and ignored events are the effective sets: the state's own plus
/// those of the state beneath it for every event the new state does not
/// declare.
#[derive(Clone)]
pub(crate) struct ActiveState {
    descriptor: Arc<StateDescriptor>,
    actions: HashMap<EventType, ErasedAction>,
    ignored: HashSet<EventType>,
}

impl ActiveState {
    pub(crate) fn new(descriptor: Arc<StateDescriptor>, lower: Option<&ActiveState>) -> Self {
        let mut actions = descriptor.actions.clone();
        let mut ignored = descriptor.ignored.clone();

        if let Some(lower) = lower {
            for (event, action) in &lower.actions {
                if !descriptor.declares(event) {
                    actions.insert(event.clone(), Arc::clone(action));
                }
            }
            for event in &lower.ignored {
                if !descriptor.declares(event) && !actions.contains_key(event) {
                    ignored.insert(event.clone());
                }
            }
        }

        Self {
            descriptor,
            actions,
            ignored,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub(crate) fn descriptor(&self) -> &Arc<StateDescriptor> {
        &self.descriptor
    }

    pub(crate) fn entry(&self) -> Option<&ErasedAction> {
        self.descriptor.entry.as_ref()
    }

    pub(crate) fn exit(&self) -> Option<&ErasedAction> {
        self.descriptor.exit.as_ref()
    }

    pub(crate) fn goto(&self, event: &EventType) -> Option<&GotoTransition> {
        self.descriptor.goto(event)
    }

    pub(crate) fn push(&self, event: &EventType) -> Option<&str> {
        self.descriptor.push(event)
    }

    pub(crate) fn action(&self, event: &EventType) -> Option<&ErasedAction> {
        self.actions.get(event)
    }

    pub(crate) fn is_ignored(&self, event: &EventType) -> bool {
        self.ignored.contains(event)
    }

    pub(crate) fn is_deferred(&self, event: &EventType) -> bool {
        self.descriptor.is_deferred(event)
    }

    /// A goto, push or action binding exists for `event`
    pub(crate) fn can_handle(&self, event: &EventType) -> bool {
        self.goto(event).is_some() || self.push(event).is_some() || self.action(event).is_some()
    }

    pub(crate) fn has_default_handler(&self) -> bool {
        self.can_handle(&EventType::default_event())
    }
}

impl std::fmt::Debug for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveState")
            .field("name", &self.name())
            .field("ignored", &self.ignored)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MachineBuilder;
    use crate::context::Context;

    #[derive(Default)]
    struct Data;

    fn noop(_: &mut Data, _: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_lower_bindings_are_merged_for_undeclared_events() {
        let descriptor = MachineBuilder::<Data>::with_default("M")
            .state("Lower", |s| {
                s.initial()
                    .on_event("Tick", noop)
                    .on_event("Shared", noop)
                    .ignore("Noise")
                    .ignore("Quiet")
                    .on_push("Enter", "Upper")
            })
            .state("Upper", |s| s.defer("Shared").on_event("Quiet", noop))
            .build()
            .unwrap();

        let lower = ActiveState::new(Arc::clone(descriptor.state("Lower").unwrap()), None);
        let upper = ActiveState::new(Arc::clone(descriptor.state("Upper").unwrap()), Some(&lower));

        assert!(upper.action(&EventType::from("Tick")).is_some());
        assert!(upper.action(&EventType::from("Shared")).is_none());
        assert!(upper.is_deferred(&EventType::from("Shared")));
        assert!(upper.is_ignored(&EventType::from("Noise")));
        assert!(!upper.is_ignored(&EventType::from("Quiet")));
        assert!(upper.can_handle(&EventType::from("Quiet")));

        // Push bindings are never inherited
        assert!(upper.push(&EventType::from("Enter")).is_none());
        assert!(!upper.has_default_handler());
    }
}
