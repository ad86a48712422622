//! Actor Descriptors
//!
//! A descriptor is the static, immutable definition of a machine or monitor
//! type: its states, their transitions, action bindings, ignored and deferred
//! events, and a factory for the actor's private data. Descriptors are built
//! once with [`MachineBuilder`](crate::MachineBuilder) or
//! [`MonitorBuilder`](crate::MonitorBuilder) and shared by every instance.
//!
//! Actions are type-erased at build time. The builder wraps a typed closure
//! `Fn(&mut S, &mut Context) -> anyhow::Result<()>` into an [`ErasedAction`]
//! that downcasts the actor's data before calling it.

use crate::context::Context;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use types::EventType;

/// Entry, exit or event action after type erasure
pub type ErasedAction =
    Arc<dyn Fn(&mut (dyn Any + Send), &mut Context<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Produces a fresh instance of an actor's private data
pub type DataFactory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Machine or monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Machine,
    Monitor,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKind::Machine => write!(f, "Machine"),
            ActorKind::Monitor => write!(f, "Monitor"),
        }
    }
}

/// Goto binding with its optional transition action
#[derive(Clone)]
pub struct GotoTransition {
    pub(crate) target: Arc<str>,
    pub(crate) exit: Option<ErasedAction>,
}

impl GotoTransition {
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for GotoTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GotoTransition")
            .field("target", &self.target)
            .field("exit", &self.exit.is_some())
            .finish()
    }
}

/// Static definition of one state
#[derive(Clone)]
pub struct StateDescriptor {
    pub(crate) name: Arc<str>,
    pub(crate) initial: bool,
    pub(crate) base: Option<Arc<str>>,
    pub(crate) entry: Option<ErasedAction>,
    pub(crate) exit: Option<ErasedAction>,
    pub(crate) gotos: HashMap<EventType, GotoTransition>,
    pub(crate) pushes: HashMap<EventType, Arc<str>>,
    pub(crate) actions: HashMap<EventType, ErasedAction>,
    pub(crate) ignored: HashSet<EventType>,
    pub(crate) deferred: HashSet<EventType>,
}

impl StateDescriptor {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            initial: false,
            base: None,
            entry: None,
            exit: None,
            gotos: HashMap::new(),
            pushes: HashMap::new(),
            actions: HashMap::new(),
            ignored: HashSet::new(),
            deferred: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn goto(&self, event: &EventType) -> Option<&GotoTransition> {
        self.gotos.get(event)
    }

    pub fn push(&self, event: &EventType) -> Option<&str> {
        self.pushes.get(event).map(|target| target.as_ref())
    }

    pub fn is_ignored(&self, event: &EventType) -> bool {
        self.ignored.contains(event)
    }

    pub fn is_deferred(&self, event: &EventType) -> bool {
        self.deferred.contains(event)
    }

    /// The state names `event` in any of its bindings or event sets
    pub fn declares(&self, event: &EventType) -> bool {
        self.gotos.contains_key(event)
            || self.pushes.contains_key(event)
            || self.actions.contains_key(event)
            || self.ignored.contains(event)
            || self.deferred.contains(event)
    }

    /// Every event type this state names
    pub(crate) fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.gotos
            .keys()
            .chain(self.pushes.keys())
            .chain(self.actions.keys())
            .chain(self.ignored.iter())
            .chain(self.deferred.iter())
    }

    /// States reachable from this one through goto or push bindings
    pub(crate) fn targets(&self) -> impl Iterator<Item = &Arc<str>> {
        self.gotos
            .values()
            .map(|transition| &transition.target)
            .chain(self.pushes.values())
    }
}

impl fmt::Debug for StateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&str> = self.actions.keys().map(EventType::as_str).collect();
        actions.sort_unstable();
        f.debug_struct("StateDescriptor")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("gotos", &self.gotos)
            .field("pushes", &self.pushes)
            .field("actions", &actions)
            .field("ignored", &self.ignored)
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// Static definition of a machine or monitor type
pub struct ActorDescriptor {
    pub(crate) type_tag: Arc<str>,
    pub(crate) kind: ActorKind,
    pub(crate) states: Vec<Arc<StateDescriptor>>,
    pub(crate) index: HashMap<Arc<str>, usize>,
    pub(crate) initial: usize,
    pub(crate) factory: DataFactory,
    pub(crate) observes: HashSet<EventType>,
}

impl ActorDescriptor {
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn state(&self, name: &str) -> Option<&Arc<StateDescriptor>> {
        self.index.get(name).map(|position| &self.states[*position])
    }

    pub fn initial_state(&self) -> &Arc<StateDescriptor> {
        &self.states[self.initial]
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|state| state.name())
    }

    /// Event types a monitor is notified of: everything its states name plus
    /// explicit `observes` entries
    /// Event types a monitor is forwarded. `Default` is synthesized by the
    /// interpreter and never delivered.
    pub fn subscriptions(&self) -> HashSet<EventType> {
        let synthesized = EventType::default_event();
        self.states
            .iter()
            .flat_map(|state| state.event_types().cloned())
            .filter(|event| *event != synthesized)
            .chain(self.observes.iter().cloned())
            .collect()
    }

    pub(crate) fn new_data(&self) -> Box<dyn Any + Send> {
        (self.factory)()
    }
}

impl fmt::Debug for ActorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorDescriptor")
            .field("type_tag", &self.type_tag)
            .field("kind", &self.kind)
            .field("states", &self.states)
            .field("initial", &self.states[self.initial].name)
            .finish()
    }
}
