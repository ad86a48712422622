//! Descriptor Builders
//!
//! Typed front end for declaring machines and monitors. Every check that can
//! be made statically happens in `build()`, so a descriptor that reaches the
//! registry is well formed:
//!
//! - exactly one initial state, at least one state
//! - no state declared twice, no event bound twice within one state
//! - every goto/push target and every `extends` base exists, no cycles
//! - monitors declare no push transitions
//!
//! State inheritance comes in two forms. [`MachineBuilder::inherit`] pulls in
//! the states of a base [`StateSet`], where a derived state with the same name
//! shadows the base one. [`StateBuilder::extends`] makes one state reuse the
//! bindings of another for every event it does not declare itself.

use crate::context::Context;
use crate::descriptor::{
    ActorDescriptor, ActorKind, DataFactory, ErasedAction, GotoTransition, StateDescriptor,
};
use crate::errors::ConfigurationError;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use types::EventType;

fn erase<S, F>(action: F) -> ErasedAction
where
    S: Send + 'static,
    F: Fn(&mut S, &mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(
        move |data: &mut (dyn Any + Send), ctx: &mut Context<'_>| -> anyhow::Result<()> {
            let data = data.downcast_mut::<S>().ok_or_else(|| {
                anyhow::anyhow!("actor data is not a {}", std::any::type_name::<S>())
            })?;
            action(data, ctx)
        },
    )
}

/// Declares the bindings of one state
pub struct StateBuilder<S> {
    state: StateDescriptor,
    conflicts: Vec<EventType>,
    _data: PhantomData<fn() -> S>,
}

impl<S: Send + 'static> StateBuilder<S> {
    fn new(name: &str) -> Self {
        Self {
            state: StateDescriptor::new(name),
            conflicts: Vec::new(),
            _data: PhantomData,
        }
    }

    fn claim(&mut self, event: &EventType) {
        if self.state.declares(event) {
            self.conflicts.push(event.clone());
        }
    }

    /// Mark as the state the actor starts in
    pub fn initial(mut self) -> Self {
        self.state.initial = true;
        self
    }

    /// Reuse the bindings of `base` for events this state does not declare
    pub fn extends(mut self, base: &str) -> Self {
        self.state.base = Some(Arc::from(base));
        self
    }

    pub fn on_entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut S, &mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.state.entry = Some(erase(action));
        self
    }

    pub fn on_exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut S, &mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.state.exit = Some(erase(action));
        self
    }

    /// On `event`, leave this state for `target`
    pub fn on_goto(mut self, event: impl Into<EventType>, target: &str) -> Self {
        let event = event.into();
        self.claim(&event);
        self.state.gotos.insert(
            event,
            GotoTransition {
                target: Arc::from(target),
                exit: None,
            },
        );
        self
    }

    /// Goto with an action that runs after this state's exit action
    pub fn on_goto_with<F>(mut self, event: impl Into<EventType>, target: &str, action: F) -> Self
    where
        F: Fn(&mut S, &mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let event = event.into();
        self.claim(&event);
        self.state.gotos.insert(
            event,
            GotoTransition {
                target: Arc::from(target),
                exit: Some(erase(action)),
            },
        );
        self
    }

    /// On `event`, push `target` on top of this state
    pub fn on_push(mut self, event: impl Into<EventType>, target: &str) -> Self {
        let event = event.into();
        self.claim(&event);
        self.state.pushes.insert(event, Arc::from(target));
        self
    }

    /// On `event`, run `action` and stay
    pub fn on_event<F>(mut self, event: impl Into<EventType>, action: F) -> Self
    where
        F: Fn(&mut S, &mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let event = event.into();
        self.claim(&event);
        self.state.actions.insert(event, erase(action));
        self
    }

    /// Drop `event` silently while in this state
    pub fn ignore(mut self, event: impl Into<EventType>) -> Self {
        let event = event.into();
        self.claim(&event);
        self.state.ignored.insert(event);
        self
    }

    /// Leave `event` queued while in this state
    pub fn defer(mut self, event: impl Into<EventType>) -> Self {
        let event = event.into();
        self.claim(&event);
        self.state.deferred.insert(event);
        self
    }
}

/// A reusable group of states, inherited by machines with the same data type
pub struct StateSet<S> {
    states: Vec<StateDescriptor>,
    conflicts: Vec<(Arc<str>, EventType)>,
    _data: PhantomData<fn() -> S>,
}

impl<S: Send + 'static> StateSet<S> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            conflicts: Vec::new(),
            _data: PhantomData,
        }
    }

    pub fn state<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(StateBuilder<S>) -> StateBuilder<S>,
    {
        let built = configure(StateBuilder::new(name));
        let name = Arc::clone(&built.state.name);
        self.conflicts
            .extend(built.conflicts.into_iter().map(|event| (Arc::clone(&name), event)));
        self.states.push(built.state);
        self
    }
}

impl<S: Send + 'static> Default for StateSet<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a machine descriptor
///
/// ```
/// use actors::MachineBuilder;
///
/// #[derive(Default)]
/// struct Door {
///     openings: u32,
/// }
///
/// let door = MachineBuilder::<Door>::with_default("Door")
///     .state("Closed", |s| s.initial().on_goto("Open", "Opened").ignore("Close"))
///     .state("Opened", |s| {
///         s.on_entry(|door, _ctx| {
///             door.openings += 1;
///             Ok(())
///         })
///         .on_goto("Close", "Closed")
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(door.initial_state().name(), "Closed");
/// ```
pub struct MachineBuilder<S> {
    type_tag: String,
    kind: ActorKind,
    derived: StateSet<S>,
    bases: Vec<(Vec<StateDescriptor>, Vec<(Arc<str>, EventType)>)>,
    observes: HashSet<EventType>,
    factory: DataFactory,
}

impl<S: Send + 'static> MachineBuilder<S> {
    pub fn new<F>(type_tag: &str, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            type_tag: type_tag.to_string(),
            kind: ActorKind::Machine,
            derived: StateSet::new(),
            bases: Vec::new(),
            observes: HashSet::new(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Any + Send>),
        }
    }

    pub fn state<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(StateBuilder<S>) -> StateBuilder<S>,
    {
        self.derived = self.derived.state(name, configure);
        self
    }

    /// Add the states of `base` that this machine does not declare itself
    pub fn inherit(mut self, base: &StateSet<S>) -> Self {
        self.bases
            .push((base.states.clone(), base.conflicts.clone()));
        self
    }

    /// Subscribe a monitor to `event` even if no state names it
    pub fn observes(mut self, event: impl Into<EventType>) -> Self {
        self.observes.insert(event.into());
        self
    }

    pub fn build(self) -> Result<ActorDescriptor, ConfigurationError> {
        let actor = self.type_tag;
        let mut states: Vec<StateDescriptor> = Vec::new();
        let mut names: HashSet<Arc<str>> = HashSet::new();
        let mut conflicts = self.derived.conflicts;

        for state in self.derived.states {
            if !names.insert(Arc::clone(&state.name)) {
                return Err(ConfigurationError::duplicate_state(&actor, &state.name));
            }
            states.push(state);
        }

        // Base states are shadowed by derived ones, then by earlier bases
        for (base_states, base_conflicts) in self.bases {
            let mut added = HashSet::new();
            for state in base_states {
                if names.contains(&state.name) {
                    continue;
                }
                added.insert(Arc::clone(&state.name));
                names.insert(Arc::clone(&state.name));
                states.push(state);
            }
            conflicts.extend(
                base_conflicts
                    .into_iter()
                    .filter(|(state, _)| added.contains(state)),
            );
        }

        if let Some((state, event)) = conflicts.first() {
            return Err(ConfigurationError::conflicting(&actor, state, event.as_str()));
        }

        if self.kind == ActorKind::Monitor {
            if let Some(state) = states.iter().find(|state| !state.pushes.is_empty()) {
                return Err(ConfigurationError::PushInMonitor {
                    monitor: actor,
                    state: state.name.to_string(),
                });
            }
        }

        if states.is_empty() {
            return Err(ConfigurationError::NoStatesDeclared { actor });
        }

        let states = resolve_extends(&actor, states)?;

        let initial: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, state)| state.initial)
            .map(|(position, _)| position)
            .collect();
        let initial = match initial.as_slice() {
            [] => return Err(ConfigurationError::NoInitialState { actor }),
            [single] => *single,
            many => {
                return Err(ConfigurationError::MultipleInitialStates {
                    states: many.iter().map(|p| states[*p].name.to_string()).collect(),
                    actor,
                })
            }
        };

        let index: HashMap<Arc<str>, usize> = states
            .iter()
            .enumerate()
            .map(|(position, state)| (Arc::clone(&state.name), position))
            .collect();

        for state in &states {
            if let Some(target) = state.targets().find(|target| !index.contains_key(*target)) {
                return Err(ConfigurationError::UnknownTargetState {
                    actor,
                    state: state.name.to_string(),
                    target: target.to_string(),
                });
            }
        }

        Ok(ActorDescriptor {
            type_tag: Arc::from(actor.as_str()),
            kind: self.kind,
            states: states.into_iter().map(Arc::new).collect(),
            index,
            initial,
            factory: self.factory,
            observes: self.observes,
        })
    }
}

impl<S: Default + Send + 'static> MachineBuilder<S> {
    /// Builder whose instances start from `S::default()`
    pub fn with_default(type_tag: &str) -> Self {
        Self::new(type_tag, S::default)
    }
}

/// Builds a monitor descriptor. Monitors have a single active state, so push
/// transitions are rejected.
pub struct MonitorBuilder<S> {
    inner: MachineBuilder<S>,
}

impl<S: Send + 'static> MonitorBuilder<S> {
    pub fn new<F>(type_tag: &str, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        let mut inner = MachineBuilder::new(type_tag, factory);
        inner.kind = ActorKind::Monitor;
        Self { inner }
    }

    pub fn state<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(StateBuilder<S>) -> StateBuilder<S>,
    {
        self.inner = self.inner.state(name, configure);
        self
    }

    pub fn inherit(mut self, base: &StateSet<S>) -> Self {
        self.inner = self.inner.inherit(base);
        self
    }

    pub fn observes(mut self, event: impl Into<EventType>) -> Self {
        self.inner = self.inner.observes(event);
        self
    }

    pub fn build(self) -> Result<ActorDescriptor, ConfigurationError> {
        self.inner.build()
    }
}

impl<S: Default + Send + 'static> MonitorBuilder<S> {
    pub fn with_default(type_tag: &str) -> Self {
        Self::new(type_tag, S::default)
    }
}

/// Fold every `extends` chain into its states
fn resolve_extends(
    actor: &str,
    states: Vec<StateDescriptor>,
) -> Result<Vec<StateDescriptor>, ConfigurationError> {
    let declared: HashMap<Arc<str>, StateDescriptor> = states
        .iter()
        .map(|state| (Arc::clone(&state.name), state.clone()))
        .collect();
    let mut resolved: HashMap<Arc<str>, StateDescriptor> = HashMap::new();

    for state in &states {
        let mut visiting = HashSet::new();
        resolve_one(actor, &state.name, &declared, &mut resolved, &mut visiting)?;
    }

    Ok(states
        .into_iter()
        .map(|state| resolved.remove(&state.name).unwrap_or(state))
        .collect())
}

fn resolve_one(
    actor: &str,
    name: &Arc<str>,
    declared: &HashMap<Arc<str>, StateDescriptor>,
    resolved: &mut HashMap<Arc<str>, StateDescriptor>,
    visiting: &mut HashSet<Arc<str>>,
) -> Result<StateDescriptor, ConfigurationError> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if !visiting.insert(Arc::clone(name)) {
        return Err(ConfigurationError::CyclicBaseState {
            actor: actor.to_string(),
            state: name.to_string(),
        });
    }

    let mut state = match declared.get(name) {
        Some(state) => state.clone(),
        None => {
            return Err(ConfigurationError::UnknownTargetState {
                actor: actor.to_string(),
                state: name.to_string(),
                target: name.to_string(),
            })
        }
    };

    if let Some(base_name) = state.base.clone() {
        if !declared.contains_key(&base_name) {
            return Err(ConfigurationError::UnknownBaseState {
                actor: actor.to_string(),
                state: name.to_string(),
                base: base_name.to_string(),
            });
        }
        let base = resolve_one(actor, &base_name, declared, resolved, visiting)?;
        merge_base(&mut state, &base);
    }

    resolved.insert(Arc::clone(name), state.clone());
    Ok(state)
}

fn merge_base(state: &mut StateDescriptor, base: &StateDescriptor) {
    if state.entry.is_none() {
        state.entry = base.entry.clone();
    }
    if state.exit.is_none() {
        state.exit = base.exit.clone();
    }

    let inherited: Vec<EventType> = base
        .event_types()
        .filter(|event| !state.declares(event))
        .cloned()
        .collect();

    for event in inherited {
        if let Some(goto) = base.gotos.get(&event) {
            state.gotos.insert(event.clone(), goto.clone());
        }
        if let Some(target) = base.pushes.get(&event) {
            state.pushes.insert(event.clone(), Arc::clone(target));
        }
        if let Some(action) = base.actions.get(&event) {
            state.actions.insert(event.clone(), Arc::clone(action));
        }
        if base.ignored.contains(&event) {
            state.ignored.insert(event.clone());
        }
        if base.deferred.contains(&event) {
            state.deferred.insert(event);
        }
    }
}
