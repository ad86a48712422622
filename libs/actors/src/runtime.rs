//! Actor Runtime
//!
//! Owns the actors of one run: their identities, mailboxes and worker
//! threads, the registered monitors and lifecycle observers, and the
//! [`SchedulingController`] every operation reports to.
//!
//! Each machine runs on its own OS thread bound to a controller operation.
//! The thread parks in the controller whenever the actor is idle, and in
//! exploration mode whenever another operation holds the turn.
//!
//! A runtime built with [`ActorRuntime::new`] runs in production mode.
//! Exploration runtimes are created by the
//! [`TestingEngine`](crate::TestingEngine), one per iteration.
//!
//! # Lock Ordering
//!
//! 1. `actors` shard (never held across a call out of the runtime)
//! 2. an actor's mailbox
//! 3. the controller
//!
//! `observers` and `workers` are leaf locks.

use crate::errors::{Result, RuntimeError};
use crate::hooks::LifecycleObserver;
use crate::machine::StateMachineCore;
use crate::mailbox::{ActorStatus, EnqueueStatus, Envelope, Mailbox, RendezvousSlot};
use crate::monitor::MonitorRegistry;
use crate::registry::Registry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use runtime_config::Configuration;
use scheduling::{
    current_operation, set_current_operation, BugKind, BugReport, ExecutionOutcome, OperationId,
    SchedulingController, SchedulingPointKind,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};
use types::{ActorId, Event, IdAllocator, IdentityError};
use uuid::Uuid;

/// Message of an assertion failure filed without one
pub const DEFAULT_ASSERTION_MESSAGE: &str = "Detected an assertion failure.";

/// Runtime-side handle of an actor
#[derive(Debug)]
struct ActorCell {
    id: ActorId,
    operation: OperationId,
    mailbox: Arc<Mailbox>,
}

struct RuntimeInner {
    runtime_id: String,
    configuration: Configuration,
    registry: Arc<Registry>,
    ids: Arc<IdAllocator>,
    controller: Arc<SchedulingController>,
    actors: DashMap<ActorId, Arc<ActorCell>>,
    monitors: MonitorRegistry,
    observers: RwLock<Vec<Arc<dyn LifecycleObserver>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a running actor system. Cheap to clone.
#[derive(Clone)]
pub struct ActorRuntime {
    inner: Arc<RuntimeInner>,
}

impl ActorRuntime {
    /// Production runtime over `registry`
    pub fn new(configuration: Configuration, registry: Arc<Registry>) -> Result<Self> {
        if configuration.is_exploration() {
            return Err(RuntimeError::invalid_operation(
                "exploration runs are driven by the TestingEngine",
            ));
        }
        let ids = Arc::new(IdAllocator::new(configuration.runtime.generation));
        let controller = Arc::new(SchedulingController::production());
        Ok(Self::with_controller(configuration, registry, ids, controller))
    }

    pub(crate) fn with_controller(
        configuration: Configuration,
        registry: Arc<Registry>,
        ids: Arc<IdAllocator>,
        controller: Arc<SchedulingController>,
    ) -> Self {
        let runtime_id = format!("runtime-{}", Uuid::new_v4());
        info!(
            runtime_id = %runtime_id,
            mode = ?controller.mode(),
            generation = ids.generation(),
            "Creating actor runtime"
        );

        Self {
            inner: Arc::new(RuntimeInner {
                runtime_id,
                configuration,
                registry,
                ids,
                controller,
                actors: DashMap::new(),
                monitors: MonitorRegistry::new(),
                observers: RwLock::new(Vec::new()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn runtime_id(&self) -> &str {
        &self.inner.runtime_id
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn controller(&self) -> &Arc<SchedulingController> {
        &self.inner.controller
    }

    pub fn is_exploration(&self) -> bool {
        self.inner.controller.is_exploration()
    }

    /// The run terminated, every further operation fails with
    /// `ExecutionCanceled`
    pub fn is_canceled(&self) -> bool {
        self.inner.controller.is_terminated()
    }

    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        self.inner.controller.outcome()
    }

    /// The bug that terminated the run, if any
    pub fn bug(&self) -> Option<BugReport> {
        self.outcome().and_then(|outcome| outcome.bug().cloned())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(RuntimeError::ExecutionCanceled);
        }
        Ok(())
    }

    /// Operation of the calling thread. Required in exploration mode.
    fn caller(&self) -> Result<Option<OperationId>> {
        let op = current_operation();
        if op.is_none() && self.is_exploration() {
            return Err(RuntimeError::invalid_operation(
                "called from a thread the controller does not schedule",
            ));
        }
        Ok(op)
    }

    fn cell(&self, id: &ActorId) -> Result<Arc<ActorCell>> {
        match self.inner.actors.get(id) {
            Some(cell) => Ok(Arc::clone(cell.value())),
            None => {
                warn!(target_actor = %id, runtime_id = %self.inner.runtime_id, "Send to unknown actor");
                Err(RuntimeError::UnknownActor(id.clone()))
            }
        }
    }

    /// Create an actor of `type_tag`. `event` becomes the received event of
    /// its initial entry action.
    pub fn create_actor(&self, type_tag: &str, event: Option<Event>) -> Result<ActorId> {
        self.spawn_actor(type_tag, None, event, false)
    }

    /// Create an actor identified by `name` instead of a counter value
    pub fn create_actor_named(
        &self,
        type_tag: &str,
        name: &str,
        event: Option<Event>,
    ) -> Result<ActorId> {
        self.spawn_actor(type_tag, Some(name), event, false)
    }

    /// Create an actor and block until its first run went idle or halted
    pub fn create_and_execute(&self, type_tag: &str, event: Option<Event>) -> Result<ActorId> {
        self.spawn_actor(type_tag, None, event, true)
    }

    fn spawn_actor(
        &self,
        type_tag: &str,
        name: Option<&str>,
        event: Option<Event>,
        execute: bool,
    ) -> Result<ActorId> {
        self.ensure_running()?;
        let caller = self.caller()?;
        let descriptor = self
            .inner
            .registry
            .machine(type_tag)
            .ok_or_else(|| RuntimeError::UnknownActorType(type_tag.to_string()))?;

        let id = self.allocate(type_tag, name)?;
        if self.inner.actors.contains_key(&id) {
            return Err(RuntimeError::invalid_operation(format!(
                "an actor with id '{}' already exists",
                id
            )));
        }

        let controller = &self.inner.controller;
        let operation = controller.register_operation(id.to_string());
        let mailbox = Arc::new(Mailbox::new());
        let slot = execute.then(|| Arc::new(RendezvousSlot::new(self.rendezvous_waiter(caller))));
        let core = StateMachineCore::machine(
            id.clone(),
            descriptor,
            Arc::clone(&mailbox),
            self.inner.configuration.runtime.dequeue_policy,
            operation,
            event,
            slot.clone(),
        );

        self.inner.actors.insert(
            id.clone(),
            Arc::new(ActorCell {
                id: id.clone(),
                operation,
                mailbox,
            }),
        );
        debug!(actor = %id, operation, runtime_id = %self.inner.runtime_id, "Created actor");
        for observer in self.observers() {
            observer.on_actor_created(&id);
        }

        if slot.is_some() {
            self.begin_rendezvous(caller);
        }
        let runtime = self.clone();
        if let Err(error) = self.spawn_thread(id.to_string(), move || drive(runtime, core)) {
            controller.complete(operation, SchedulingPointKind::Halt);
            self.end_rendezvous(caller);
            return Err(error);
        }

        match slot {
            Some(slot) => {
                self.rendezvous(caller, SchedulingPointKind::Create, &slot)?;
            }
            None => self.scheduling_point(SchedulingPointKind::Create)?,
        }
        Ok(id)
    }

    fn allocate(&self, type_tag: &str, name: Option<&str>) -> Result<ActorId> {
        let allocated = match name {
            Some(name) => self.inner.ids.create(type_tag, name, true),
            None => self.inner.ids.create(type_tag, "", false),
        };
        allocated.map_err(|error| {
            if let IdentityError::Overflow { .. } = error {
                self.report_bug(BugReport::new(BugKind::Overflow, error.to_string(), None));
            }
            RuntimeError::from(error)
        })
    }

    /// Fire-and-forget send
    ///
    /// Subscribed monitors see the event first, on the caller's turn. Events
    /// sent to a halted actor are dropped silently.
    pub fn send(&self, target: &ActorId, event: Event) -> Result<()> {
        self.ensure_running()?;
        self.caller()?;
        let cell = self.cell(target)?;
        self.inner.monitors.forward(self, &event)?;

        debug!(target_actor = %target, event = %event.event_type(), "Send");
        self.enqueue(&cell, Envelope::new(event));
        self.scheduling_point(SchedulingPointKind::Send)
    }

    /// Send and block until `target` processed the event and went idle or
    /// halted
    ///
    /// Returns `true` if a goto, push or action binding (including one on
    /// `Default`) consumed the event, `false` if the target halted or ignored
    /// it.
    pub fn send_and_execute(&self, target: &ActorId, event: Event) -> Result<bool> {
        self.ensure_running()?;
        let caller = self.caller()?;
        let cell = self.cell(target)?;
        if caller.is_some() && caller == Some(cell.operation) {
            let message = format!("Machine '{}' can not rendezvous with itself.", target);
            return Err(self.report_assertion(Some(target), message));
        }
        self.inner.monitors.forward(self, &event)?;

        debug!(target_actor = %target, event = %event.event_type(), "Send and execute");
        let slot = Arc::new(RendezvousSlot::new(self.rendezvous_waiter(caller)));
        self.begin_rendezvous(caller);
        self.enqueue(&cell, Envelope::with_rendezvous(event, Arc::clone(&slot)));
        self.rendezvous(caller, SchedulingPointKind::Rendezvous, &slot)
    }

    fn enqueue(&self, cell: &ActorCell, envelope: Envelope) -> EnqueueStatus {
        let controller = &self.inner.controller;
        let status = cell
            .mailbox
            .enqueue(envelope, || controller.enable(cell.operation));
        if status == EnqueueStatus::Dropped {
            trace!(actor = %cell.id, "Dropped event sent to halted actor");
        }
        status
    }

    fn rendezvous_waiter(
        &self,
        caller: Option<OperationId>,
    ) -> Option<(OperationId, Arc<SchedulingController>)> {
        match caller {
            Some(op) if self.is_exploration() => Some((op, Arc::clone(&self.inner.controller))),
            _ => None,
        }
    }

    fn begin_rendezvous(&self, caller: Option<OperationId>) {
        if let Some(op) = caller.filter(|_| self.is_exploration()) {
            self.inner.controller.block(op);
        }
    }

    fn end_rendezvous(&self, caller: Option<OperationId>) {
        if let Some(op) = caller.filter(|_| self.is_exploration()) {
            self.inner.controller.unblock(op);
        }
    }

    fn rendezvous(
        &self,
        caller: Option<OperationId>,
        kind: SchedulingPointKind,
        slot: &RendezvousSlot,
    ) -> Result<bool> {
        match caller.filter(|_| self.is_exploration()) {
            Some(op) => {
                self.inner.controller.schedule(op, kind)?;
                Ok(slot.result().unwrap_or(false))
            }
            None => Ok(slot.wait(&self.inner.controller)?),
        }
    }

    /// Instantiate and start the monitor registered as `type_tag`
    pub fn register_monitor(&self, type_tag: &str) -> Result<()> {
        self.ensure_running()?;
        let descriptor = self
            .inner
            .registry
            .monitor(type_tag)
            .ok_or_else(|| RuntimeError::UnknownMonitor(type_tag.to_string()))?;
        let id = self.inner.ids.create(type_tag, type_tag, true)?;
        self.inner.monitors.register(self, id, descriptor)
    }

    /// Deliver `event` to one monitor, whatever its subscriptions
    pub fn monitor(&self, type_tag: &str, event: Event) -> Result<()> {
        self.ensure_running()?;
        self.inner.monitors.deliver_to(self, type_tag, event)
    }

    /// Current state of the monitor registered as `type_tag`
    pub fn monitor_state(&self, type_tag: &str) -> Option<String> {
        self.inner.monitors.state_of(type_tag)
    }

    pub fn monitors(&self) -> Vec<String> {
        self.inner.monitors.registered()
    }

    /// Fail the run with `message` unless `predicate` holds
    pub fn assert(&self, predicate: bool, message: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        if predicate {
            return Ok(());
        }
        Err(self.report_assertion(None, message.into()))
    }

    pub fn random_bool(&self) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.inner.controller.next_bool()?)
    }

    /// Nondeterministic integer in `0..max`
    pub fn random_int(&self, max: u64) -> Result<u64> {
        self.ensure_running()?;
        Ok(self.inner.controller.next_int(max)?)
    }

    /// Offer a scheduling point of `kind` on behalf of the calling thread
    ///
    /// Custom components such as shared objects call this before touching
    /// shared state so that the access becomes part of the explored
    /// interleaving.
    pub fn scheduling_point(&self, kind: SchedulingPointKind) -> Result<()> {
        self.ensure_running()?;
        if !self.is_exploration() {
            return Ok(());
        }
        match self.caller()? {
            Some(op) => Ok(self.inner.controller.schedule(op, kind)?),
            None => Ok(()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) {
        self.inner.observers.write().push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn LifecycleObserver>> {
        self.inner.observers.read().clone()
    }

    /// Block until no actor has work (production mode)
    pub fn wait_for_quiescence(&self) -> Result<()> {
        if self.is_exploration() {
            return Err(RuntimeError::invalid_operation(
                "quiescence of an exploration run is decided by the controller",
            ));
        }
        Ok(self.inner.controller.wait_for_quiescence()?)
    }

    pub fn actor_status(&self, id: &ActorId) -> Option<ActorStatus> {
        self.inner.actors.get(id).map(|cell| cell.mailbox.status())
    }

    /// Every actor created so far, halted ones included, in id order
    pub fn actors(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.inner.actors.iter().map(|cell| cell.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Terminate the run and join every worker thread
    pub fn shutdown(&self) {
        if self.inner.controller.terminate(ExecutionOutcome::Stopped) {
            info!(runtime_id = %self.inner.runtime_id, "Stopping actor runtime");
        }

        // Workers may spawn more workers until they observe the termination
        loop {
            let workers: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
            if workers.is_empty() {
                break;
            }
            for worker in workers {
                let name = worker.thread().name().map(str::to_string);
                if worker.join().is_err() {
                    warn!(worker = ?name, "Worker thread panicked");
                }
            }
        }
        debug!(runtime_id = %self.inner.runtime_id, "Actor runtime stopped");
    }

    pub(crate) fn report_bug(&self, report: BugReport) -> bool {
        self.inner.controller.report_bug(report)
    }

    /// File an assertion failure and return the error the caller unwinds with
    pub(crate) fn report_assertion(&self, actor: Option<&ActorId>, message: String) -> RuntimeError {
        self.report_bug(BugReport::assertion(message.clone(), actor.cloned()));
        RuntimeError::AssertionFailure(message)
    }

    /// The actor of `operation` went idle. Runs under its mailbox lock.
    pub(crate) fn actor_idle(&self, operation: Option<OperationId>) {
        if let Some(op) = operation {
            self.inner.controller.disable(op);
        }
    }

    pub(crate) fn actor_destroyed(&self, id: &ActorId) {
        for observer in self.observers() {
            observer.on_actor_destroyed(id);
        }
    }

    /// Spawn a named thread that is joined on shutdown
    pub(crate) fn spawn_thread<F>(&self, name: String, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(work)
            .map_err(|error| {
                RuntimeError::invalid_operation(format!("failed to spawn thread {}: {}", name, error))
            })?;
        let mut workers = self.inner.workers.lock();
        // Halted actors and fired timers leave finished threads behind
        workers.retain(|worker| !worker.is_finished());
        workers.push(handle);
        Ok(())
    }

    #[cfg(test)]
    fn worker_count(&self) -> usize {
        self.inner.workers.lock().len()
    }
}

impl std::fmt::Debug for ActorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRuntime")
            .field("runtime_id", &self.inner.runtime_id)
            .field("actors", &self.inner.actors.len())
            .field("monitors", &self.inner.monitors.registered())
            .field("controller", &self.inner.controller)
            .finish()
    }
}

/// Worker loop of one machine
fn drive(runtime: ActorRuntime, mut core: StateMachineCore) {
    let Some(op) = core.operation() else {
        return;
    };
    set_current_operation(Some(op));
    let controller = Arc::clone(runtime.controller());

    if controller.wait_for_turn(op).is_ok() {
        loop {
            match core.run(&runtime) {
                Ok(ActorStatus::Halted) => {
                    controller.complete(op, SchedulingPointKind::Halt);
                    break;
                }
                Ok(_) => {
                    if controller.schedule(op, SchedulingPointKind::Yield).is_err() {
                        core.abandon();
                        break;
                    }
                }
                Err(error) => {
                    trace!(actor = %core.id(), error = %error, "Actor unwound");
                    core.abandon();
                    controller.complete(op, SchedulingPointKind::Yield);
                    break;
                }
            }
        }
    } else {
        core.abandon();
    }

    set_current_operation(None);
}
