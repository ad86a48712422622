//! Action Context
//!
//! The handle entry, exit and event actions receive. Everything an action may
//! do to the outside world goes through it: sending, creating actors,
//! rendezvous, nondeterministic choices, assertions, timers, and the
//! actor-local raise/goto/push/pop requests.
//!
//! Raise, goto, push, pop and halt do not take effect immediately. They are
//! stored in the actor's single raised slot and handled at the top of its
//! next selection cycle, after the running action returned. One request per
//! action; exit actions may not make any.

use crate::descriptor::{ActorDescriptor, ActorKind};
use crate::errors::{Result, RuntimeError};
use crate::runtime::ActorRuntime;
use crate::timers;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::{ActorId, Event};

/// Request stored in the raised slot
#[derive(Debug, Clone)]
pub(crate) enum Raised {
    Event(Event),
    Goto(Arc<str>),
    Push(Arc<str>),
    Pop,
}

/// Which kind of action is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Entry,
    Exit,
    Action,
}

pub struct Context<'a> {
    runtime: &'a ActorRuntime,
    actor: &'a ActorId,
    descriptor: &'a ActorDescriptor,
    state: &'a str,
    received: Option<&'a Event>,
    raised: &'a mut Option<Raised>,
    phase: Phase,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        runtime: &'a ActorRuntime,
        actor: &'a ActorId,
        descriptor: &'a ActorDescriptor,
        state: &'a str,
        received: Option<&'a Event>,
        raised: &'a mut Option<Raised>,
        phase: Phase,
    ) -> Self {
        Self {
            runtime,
            actor,
            descriptor,
            state,
            received,
            raised,
            phase,
        }
    }

    /// Identity of the running actor
    pub fn id(&self) -> &ActorId {
        self.actor
    }

    /// Name of the current state
    pub fn state(&self) -> &str {
        self.state
    }

    /// The event that triggered this action. For the initial entry action
    /// this is the creation event.
    pub fn received_event(&self) -> Option<&Event> {
        self.received
    }

    /// Payload of the received event as `T`
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.received.and_then(|event| event.payload_as::<T>())
    }

    /// Runtime this actor lives in, for components such as shared objects
    /// that offer their own scheduling points
    pub fn runtime(&self) -> &ActorRuntime {
        self.runtime
    }

    fn label(&self) -> String {
        format!("{} '{}'", self.descriptor.kind(), self.actor)
    }

    fn ensure_machine(&self, operation: &str) -> Result<()> {
        if self.descriptor.kind() == ActorKind::Monitor {
            return Err(RuntimeError::invalid_operation(format!(
                "{} can not {}",
                self.label(),
                operation
            )));
        }
        Ok(())
    }

    fn request(&mut self, request: Raised) -> Result<()> {
        if self.phase == Phase::Exit {
            let message = format!(
                "{} has called raise, goto, push or pop inside an exit action.",
                self.label()
            );
            return Err(self.runtime.report_assertion(Some(self.actor), message));
        }
        if self.raised.is_some() {
            let message = format!(
                "{} has called raise, goto, push or pop more than once in the same action.",
                self.label()
            );
            return Err(self.runtime.report_assertion(Some(self.actor), message));
        }

        debug!(actor = %self.actor, state = %self.state, request = ?request, "Raised");
        *self.raised = Some(request);
        Ok(())
    }

    fn known_state(&self, target: &str) -> Result<Arc<str>> {
        match self.descriptor.state(target) {
            Some(state) => Ok(Arc::clone(&state.name)),
            None => {
                let message = format!(
                    "{} tried to transition to unknown state '{}'.",
                    self.label(),
                    target
                );
                Err(self.runtime.report_assertion(Some(self.actor), message))
            }
        }
    }

    pub fn send(&mut self, target: &ActorId, event: Event) -> Result<()> {
        self.ensure_machine("send events")?;
        self.runtime.send(target, event)
    }

    /// Send and block until `target` processed the event and went idle.
    /// Returns whether a binding consumed the event.
    pub fn send_and_execute(&mut self, target: &ActorId, event: Event) -> Result<bool> {
        self.ensure_machine("send events")?;
        self.runtime.send_and_execute(target, event)
    }

    pub fn create_actor(&mut self, type_tag: &str, event: Option<Event>) -> Result<ActorId> {
        self.ensure_machine("create actors")?;
        self.runtime.create_actor(type_tag, event)
    }

    pub fn create_actor_named(
        &mut self,
        type_tag: &str,
        name: &str,
        event: Option<Event>,
    ) -> Result<ActorId> {
        self.ensure_machine("create actors")?;
        self.runtime.create_actor_named(type_tag, name, event)
    }

    /// Create an actor and block until its first run reached idle
    pub fn create_and_execute(&mut self, type_tag: &str, event: Option<Event>) -> Result<ActorId> {
        self.ensure_machine("create actors")?;
        self.runtime.create_and_execute(type_tag, event)
    }

    /// Handle `event` at the start of the next selection cycle, before any
    /// queued event
    pub fn raise(&mut self, event: Event) -> Result<()> {
        self.request(Raised::Event(event))
    }

    pub fn goto(&mut self, state: &str) -> Result<()> {
        let target = self.known_state(state)?;
        self.request(Raised::Goto(target))
    }

    pub fn push(&mut self, state: &str) -> Result<()> {
        if self.descriptor.kind() == ActorKind::Monitor {
            let message = format!("{} can not push states.", self.label());
            return Err(self.runtime.report_assertion(Some(self.actor), message));
        }
        let target = self.known_state(state)?;
        self.request(Raised::Push(target))
    }

    pub fn pop(&mut self) -> Result<()> {
        if self.descriptor.kind() == ActorKind::Monitor {
            let message = format!("{} can not pop states.", self.label());
            return Err(self.runtime.report_assertion(Some(self.actor), message));
        }
        self.request(Raised::Pop)
    }

    /// Raise `Halt`
    pub fn halt(&mut self) -> Result<()> {
        self.raise(Event::halt())
    }

    /// Fail the run with `message` unless `predicate` holds
    pub fn assert(&self, predicate: bool, message: impl Into<String>) -> Result<()> {
        if predicate {
            return Ok(());
        }
        Err(self.runtime.report_assertion(Some(self.actor), message.into()))
    }

    pub fn assert_true(&self, predicate: bool) -> Result<()> {
        self.assert(predicate, crate::runtime::DEFAULT_ASSERTION_MESSAGE)
    }

    pub fn random_bool(&self) -> Result<bool> {
        self.runtime.random_bool()
    }

    pub fn random_int(&self, max: u64) -> Result<u64> {
        self.runtime.random_int(max)
    }

    /// Start a timer that sends `TimerElapsed` to this actor
    pub fn start_timer(&mut self, period: Duration, periodic: bool) -> Result<ActorId> {
        self.ensure_machine("start timers")?;
        timers::start(self.runtime, self.actor, period, periodic)
    }

    pub fn stop_timer(&mut self, timer: &ActorId) -> Result<()> {
        self.ensure_machine("stop timers")?;
        timers::stop(self.runtime, timer)
    }

    /// Deliver `event` to the monitor registered as `type_tag`
    pub fn monitor(&mut self, type_tag: &str, event: Event) -> Result<()> {
        self.ensure_machine("notify monitors")?;
        self.runtime.monitor(type_tag, event)
    }
}
