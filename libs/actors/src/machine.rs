//! State Machine Core
//!
//! The interpreter shared by machines and monitors. A core owns the actor's
//! private data, its state stack and the raised slot; machines additionally
//! own a worker thread that calls [`StateMachineCore::run`] whenever the
//! controller schedules them.
//!
//! # Selection
//!
//! Each cycle first handles the raised slot, then asks the mailbox for the
//! next event under the configured [`DequeuePolicy`]. Ignored events are
//! discarded and deferred events stay queued under both policies. With
//! nothing selectable, a state that handles `Default` gets a synthetic
//! `Default` event; otherwise the actor goes idle.
//!
//! # Handling
//!
//! States that cannot handle the event are popped silently until one can.
//! An empty stack halts the actor on `Halt` and reports an unhandled event on
//! anything else. Bindings are tried in order goto, push, action.
//!
//! # Failure containment
//!
//! Every action runs under `catch_unwind`. An `Err` or a panic is reported as
//! an action fault with the actor, the state and a backtrace, except for the
//! runtime's own cancellation signal, which only unwinds the actor.

use crate::context::{Context, Phase, Raised};
use crate::descriptor::{ActorDescriptor, ActorKind, ErasedAction, GotoTransition};
use crate::errors::{Result, RuntimeError};
use crate::mailbox::{ActorStatus, Dequeued, Envelope, Mailbox, RendezvousSlot, Selection};
use crate::runtime::ActorRuntime;
use crate::state::ActiveState;
use runtime_config::DequeuePolicy;
use scheduling::{BugKind, BugReport, OperationId, SchedulingPointKind};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use tracing::{debug, trace};
use types::{ActorId, Event, EventType};

pub struct StateMachineCore {
    id: ActorId,
    descriptor: Arc<ActorDescriptor>,
    data: Box<dyn Any + Send>,
    stack: Vec<ActiveState>,
    raised: Option<Raised>,
    mailbox: Arc<Mailbox>,
    policy: DequeuePolicy,
    operation: Option<OperationId>,
    creation_event: Option<Event>,
    creation_slot: Option<Arc<RendezvousSlot>>,
    /// Rendezvous delivered this run, completed when the actor goes idle
    pending: Vec<(Arc<RendezvousSlot>, bool)>,
    halted: bool,
}

impl StateMachineCore {
    pub(crate) fn machine(
        id: ActorId,
        descriptor: Arc<ActorDescriptor>,
        mailbox: Arc<Mailbox>,
        policy: DequeuePolicy,
        operation: OperationId,
        creation_event: Option<Event>,
        creation_slot: Option<Arc<RendezvousSlot>>,
    ) -> Self {
        let data = descriptor.new_data();
        Self {
            id,
            descriptor,
            data,
            stack: Vec::new(),
            raised: None,
            mailbox,
            policy,
            operation: Some(operation),
            creation_event,
            creation_slot,
            pending: Vec::new(),
            halted: false,
        }
    }

    pub(crate) fn monitor(id: ActorId, descriptor: Arc<ActorDescriptor>) -> Self {
        let data = descriptor.new_data();
        Self {
            id,
            descriptor,
            data,
            stack: Vec::new(),
            raised: None,
            mailbox: Arc::new(Mailbox::new()),
            policy: DequeuePolicy::FirstNonDeferred,
            operation: None,
            creation_event: None,
            creation_slot: None,
            pending: Vec::new(),
            halted: false,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn current_state(&self) -> Option<&str> {
        self.stack.last().map(ActiveState::name)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn operation(&self) -> Option<OperationId> {
        self.operation
    }

    fn label(&self) -> String {
        match self.descriptor.kind() {
            ActorKind::Machine => format!("Machine '{}'", self.id),
            ActorKind::Monitor => format!("Monitor '{}'", self.descriptor.type_tag()),
        }
    }

    /// Process events until the actor goes idle or halts
    pub(crate) fn run(&mut self, rt: &ActorRuntime) -> Result<ActorStatus> {
        if self.halted {
            return Ok(ActorStatus::Halted);
        }

        if self.mailbox.start() == ActorStatus::Uninitialized {
            if let Some(slot) = self.creation_slot.take() {
                self.pending.push((slot, true));
            }
            let event = self.creation_event.take();
            self.enter_initial(rt, event.as_ref())?;
        }

        loop {
            if rt.is_canceled() {
                return Err(RuntimeError::ExecutionCanceled);
            }
            if self.halted {
                return Ok(ActorStatus::Halted);
            }

            if let Some(raised) = self.raised.take() {
                self.process_raised(rt, raised)?;
                continue;
            }

            match self.next_event(rt) {
                Dequeued::Event(envelope) => self.dispatch(rt, envelope)?,
                Dequeued::Default => {
                    rt.scheduling_point(SchedulingPointKind::DefaultEvent)?;
                    trace!(actor = %self.id, "Handling default event");
                    self.handle_event(rt, Event::default_event())?;
                }
                Dequeued::Idle => {
                    debug!(actor = %self.id, state = ?self.current_state(), "Idle");
                    for (slot, handled) in self.pending.drain(..) {
                        slot.complete(handled);
                    }
                    return Ok(ActorStatus::Idle);
                }
            }
        }
    }

    fn next_event(&self, rt: &ActorRuntime) -> Dequeued {
        let Some(top) = self.stack.last() else {
            return Dequeued::Idle;
        };
        let policy = self.policy;
        let verdict = |event: &EventType| {
            if top.is_ignored(event) {
                Selection::Discard
            } else if top.is_deferred(event) {
                Selection::Skip
            } else {
                match policy {
                    DequeuePolicy::FirstNonDeferred => Selection::Take,
                    DequeuePolicy::FirstUnhandled if top.can_handle(event) => Selection::Skip,
                    DequeuePolicy::FirstUnhandled => Selection::Take,
                }
            }
        };

        let (dequeued, discarded) =
            self.mailbox
                .dequeue(verdict, top.has_default_handler(), || rt.actor_idle(self.operation));

        for envelope in discarded {
            trace!(actor = %self.id, event = %envelope.event.event_type(), "Discarded ignored event");
            envelope.drop_unhandled();
        }
        dequeued
    }

    fn dispatch(&mut self, rt: &ActorRuntime, envelope: Envelope) -> Result<()> {
        let Envelope { event, rendezvous } = envelope;
        debug!(
            actor = %self.id,
            event = %event.event_type(),
            state = ?self.current_state(),
            "Dequeued event"
        );
        let handled = self.handle_event(rt, event)?;
        if let Some(slot) = rendezvous {
            if self.halted {
                slot.complete(false);
            } else {
                self.pending.push((slot, handled));
            }
        }
        Ok(())
    }

    /// Returns whether a binding consumed `event`
    fn handle_event(&mut self, rt: &ActorRuntime, event: Event) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                if event.is_halt() {
                    self.halt(rt);
                    return Ok(false);
                }
                let message = format!(
                    "{} received event '{}' that cannot be handled.",
                    self.label(),
                    event.event_type()
                );
                rt.report_bug(BugReport::new(
                    BugKind::UnhandledEvent,
                    message,
                    Some(self.id.clone()),
                ));
                return Err(RuntimeError::ExecutionCanceled);
            };
            let event_type = event.event_type();

            if top.is_ignored(event_type) {
                trace!(actor = %self.id, event = %event_type, "Ignored raised event");
                return Ok(false);
            }

            if !top.can_handle(event_type) {
                trace!(actor = %self.id, state = %top.name(), event = %event_type, "Popping state that cannot handle event");
                self.stack.pop();
                continue;
            }

            if let Some(transition) = top.goto(event_type).cloned() {
                self.goto_state(rt, &transition, Some(&event))?;
            } else if let Some(target) = top.push(event_type).map(Arc::<str>::from) {
                self.push_state(rt, &target, Some(&event))?;
            } else if let Some(action) = top.action(event_type).cloned() {
                debug!(actor = %self.id, state = %top.name(), event = %event_type, "Action");
                self.invoke(rt, &action, Some(&event), Phase::Action)?;
            }
            return Ok(true);
        }
    }

    fn process_raised(&mut self, rt: &ActorRuntime, raised: Raised) -> Result<()> {
        match raised {
            Raised::Event(event) => {
                debug!(actor = %self.id, event = %event.event_type(), "Handling raised event");
                self.handle_event(rt, event)?;
            }
            Raised::Goto(target) => {
                let transition = GotoTransition { target, exit: None };
                self.goto_state(rt, &transition, None)?;
            }
            Raised::Push(target) => self.push_state(rt, &target, None)?,
            Raised::Pop => self.pop_state(rt)?,
        }
        Ok(())
    }

    fn enter_initial(&mut self, rt: &ActorRuntime, event: Option<&Event>) -> Result<()> {
        let initial = ActiveState::new(Arc::clone(self.descriptor.initial_state()), None);
        debug!(actor = %self.id, state = %initial.name(), "Entering initial state");
        self.stack.push(initial);
        self.run_entry(rt, event)
    }

    fn goto_state(
        &mut self,
        rt: &ActorRuntime,
        transition: &GotoTransition,
        event: Option<&Event>,
    ) -> Result<()> {
        self.run_exit(rt, event)?;
        if let Some(exit) = &transition.exit {
            self.invoke(rt, exit, event, Phase::Exit)?;
        }
        if self.halted {
            return Ok(());
        }

        self.stack.pop();
        let state = self.instantiate(rt, &transition.target)?;
        debug!(actor = %self.id, state = %state.name(), "Goto");
        self.stack.push(state);
        self.run_entry(rt, event)
    }

    fn push_state(&mut self, rt: &ActorRuntime, target: &str, event: Option<&Event>) -> Result<()> {
        let state = self.instantiate(rt, target)?;
        debug!(actor = %self.id, state = %state.name(), depth = self.stack.len() + 1, "Push");
        self.stack.push(state);
        self.run_entry(rt, event)
    }

    fn pop_state(&mut self, rt: &ActorRuntime) -> Result<()> {
        if self.stack.len() <= 1 {
            let message = format!("{} popped with no matching push.", self.label());
            return Err(rt.report_assertion(Some(&self.id), message));
        }
        self.run_exit(rt, None)?;
        self.stack.pop();
        debug!(actor = %self.id, state = ?self.current_state(), "Pop");
        Ok(())
    }

    fn instantiate(&self, rt: &ActorRuntime, target: &str) -> Result<ActiveState> {
        match self.descriptor.state(target) {
            Some(descriptor) => Ok(ActiveState::new(Arc::clone(descriptor), self.stack.last())),
            None => {
                let message = format!("{} has no state '{}'.", self.label(), target);
                Err(rt.report_assertion(Some(&self.id), message))
            }
        }
    }

    fn run_entry(&mut self, rt: &ActorRuntime, event: Option<&Event>) -> Result<()> {
        let entry = self.stack.last().and_then(ActiveState::entry).cloned();
        match entry {
            Some(entry) => self.invoke(rt, &entry, event, Phase::Entry),
            None => Ok(()),
        }
    }

    fn run_exit(&mut self, rt: &ActorRuntime, event: Option<&Event>) -> Result<()> {
        let exit = self.stack.last().and_then(ActiveState::exit).cloned();
        match exit {
            Some(exit) => self.invoke(rt, &exit, event, Phase::Exit),
            None => Ok(()),
        }
    }

    fn invoke(
        &mut self,
        rt: &ActorRuntime,
        action: &ErasedAction,
        event: Option<&Event>,
        phase: Phase,
    ) -> Result<()> {
        let state: Arc<str> = self
            .stack
            .last()
            .map(|top| Arc::clone(&top.descriptor().name))
            .unwrap_or_else(|| Arc::from(""));

        let outcome = {
            let mut ctx = Context::new(
                rt,
                &self.id,
                &self.descriptor,
                &state,
                event,
                &mut self.raised,
                phase,
            );
            let data = self.data.as_mut();
            install_panic_hook();
            take_panic_backtrace();
            panic::catch_unwind(AssertUnwindSafe(|| action(data, &mut ctx)))
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                let signalled = error
                    .downcast_ref::<RuntimeError>()
                    .is_some_and(RuntimeError::is_termination);
                if signalled || rt.is_canceled() {
                    return Err(RuntimeError::ExecutionCanceled);
                }
                let backtrace = error.backtrace().to_string();
                Err(self.fault(rt, &state, &error.to_string(), &backtrace))
            }
            Err(panic) => {
                if rt.is_canceled() {
                    return Err(RuntimeError::ExecutionCanceled);
                }
                let backtrace =
                    take_panic_backtrace().unwrap_or_else(|| Backtrace::force_capture().to_string());
                Err(self.fault(rt, &state, &panic_message(panic.as_ref()), &backtrace))
            }
        }
    }

    fn fault(&self, rt: &ActorRuntime, state: &str, error: &str, backtrace: &str) -> RuntimeError {
        let subject = match self.descriptor.kind() {
            ActorKind::Machine => format!("machine '{}'", self.id),
            ActorKind::Monitor => format!("monitor '{}'", self.descriptor.type_tag()),
        };
        let message = format!(
            "Exception '{}' was thrown in {}, state '{}'. The stack trace is:\n{}\n",
            error, subject, state, backtrace
        );
        rt.report_bug(BugReport::new(
            BugKind::ActionFault,
            message,
            Some(self.id.clone()),
        ));
        RuntimeError::ExecutionCanceled
    }

    /// Halt: drop the stack and the mailbox, fail pending rendezvous
    pub(crate) fn halt(&mut self, rt: &ActorRuntime) {
        if self.halted {
            return;
        }
        self.halted = true;
        self.stack.clear();
        self.raised = None;

        let dropped = self.mailbox.halt();
        debug!(actor = %self.id, dropped = dropped.len(), "Halted");
        for envelope in dropped {
            envelope.drop_unhandled();
        }
        if let Some(slot) = self.creation_slot.take() {
            slot.complete(false);
        }
        for (slot, _) in self.pending.drain(..) {
            slot.complete(false);
        }
        rt.actor_destroyed(&self.id);
    }

    /// The run was canceled: release every waiter without notifying hooks
    pub(crate) fn abandon(&mut self) {
        for envelope in self.mailbox.halt() {
            envelope.drop_unhandled();
        }
        if let Some(slot) = self.creation_slot.take() {
            slot.complete(false);
        }
        for (slot, _) in self.pending.drain(..) {
            slot.complete(false);
        }
    }

    /// Install the initial state of a monitor and run its entry action
    pub(crate) fn start_monitor(&mut self, rt: &ActorRuntime) -> Result<()> {
        self.enter_initial(rt, None)?;
        self.drain_raised(rt)?;
        self.run_default_handlers(rt)
    }

    /// Synchronously hand `event` to a monitor
    pub(crate) fn deliver(&mut self, rt: &ActorRuntime, event: Event) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        if let Some(top) = self.stack.last() {
            let event_type = event.event_type();
            if top.is_ignored(event_type) || top.is_deferred(event_type) {
                trace!(monitor = %self.id, event = %event_type, "Monitor skipped event");
                return Ok(());
            }
        }
        debug!(monitor = %self.id, event = %event.event_type(), state = ?self.current_state(), "Monitor event");
        self.handle_event(rt, event)?;
        self.drain_raised(rt)?;
        self.run_default_handlers(rt)
    }

    /// A monitor has no queue, so a state with a `Default` binding consumes
    /// the synthetic event as soon as it becomes current
    fn run_default_handlers(&mut self, rt: &ActorRuntime) -> Result<()> {
        while !self.halted
            && self
                .stack
                .last()
                .is_some_and(|top| top.has_default_handler())
        {
            trace!(monitor = %self.id, state = ?self.current_state(), "Monitor default handler");
            self.handle_event(rt, Event::default_event())?;
            self.drain_raised(rt)?;
        }
        Ok(())
    }

    fn drain_raised(&mut self, rt: &ActorRuntime) -> Result<()> {
        while let Some(raised) = self.raised.take() {
            if self.halted {
                break;
            }
            self.process_raised(rt, raised)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StateMachineCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineCore")
            .field("id", &self.id)
            .field("type_tag", &self.descriptor.type_tag())
            .field("stack", &self.stack)
            .field("raised", &self.raised)
            .field("halted", &self.halted)
            .finish()
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Chain a hook that records the backtrace at the panic site, so a contained
/// panic reports the frames of the action instead of those of the catch
pub(crate) fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Backtrace of the last panic on this thread, if not yet taken
pub(crate) fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
