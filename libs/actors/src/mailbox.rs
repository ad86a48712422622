//! Actor Mailbox
//!
//! FIFO queue of envelopes plus the actor status. Event selection and the
//! transition to `Idle` happen under the same lock, and the controller is told
//! about the transition while that lock is held, so an enqueue racing with
//! the actor going idle always observes either `Running` (the actor will find
//! the event) or `Idle` (the enqueue wakes it).
//!
//! # Lock Ordering
//!
//! The mailbox lock may be held while calling into the
//! [`SchedulingController`]. Never take a mailbox lock while holding the
//! controller lock.

use parking_lot::{Condvar, Mutex};
use scheduling::{Canceled, OperationId, SchedulingController};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use types::{Event, EventType};

/// How long a production rendezvous waits before re-checking for termination
const RENDEZVOUS_POLL: Duration = Duration::from_millis(10);

/// Lifecycle status of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    /// Created, initial entry action not yet run
    Uninitialized,
    Running,
    /// Nothing selectable, waiting for an enqueue
    Idle,
    Halted,
}

/// Result of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    /// The actor has halted, the envelope was discarded
    Dropped,
    Queued,
    /// Queued, and the actor was idle
    NeedsWake,
}

/// Reply channel for a rendezvous
///
/// Completed exactly once: with `true` if the delivered event was consumed by
/// a binding, `false` if it was not or the target halted.
pub struct RendezvousSlot {
    result: Mutex<Option<bool>>,
    ready: Condvar,
    waiter: Option<(OperationId, Arc<SchedulingController>)>,
}

impl RendezvousSlot {
    /// Slot whose completion re-enables `waiter` in the controller
    pub(crate) fn new(waiter: Option<(OperationId, Arc<SchedulingController>)>) -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
            waiter,
        }
    }

    pub(crate) fn complete(&self, handled: bool) {
        let mut result = self.result.lock();
        if result.is_some() {
            return;
        }
        *result = Some(handled);
        self.ready.notify_all();
        if let Some((op, controller)) = &self.waiter {
            controller.unblock(*op);
        }
    }

    pub(crate) fn result(&self) -> Option<bool> {
        *self.result.lock()
    }

    /// Block the calling thread until completion or termination of the run
    pub(crate) fn wait(&self, controller: &SchedulingController) -> Result<bool, Canceled> {
        let mut result = self.result.lock();
        loop {
            if let Some(handled) = *result {
                return Ok(handled);
            }
            if controller.is_terminated() {
                return Err(Canceled);
            }
            self.ready.wait_for(&mut result, RENDEZVOUS_POLL);
        }
    }
}

impl std::fmt::Debug for RendezvousSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousSlot")
            .field("result", &self.result())
            .field("waiter", &self.waiter.as_ref().map(|(op, _)| *op))
            .finish()
    }
}

/// An event in transit, with the rendezvous waiting for it if any
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    pub rendezvous: Option<Arc<RendezvousSlot>>,
}

impl Envelope {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            rendezvous: None,
        }
    }

    pub(crate) fn with_rendezvous(event: Event, slot: Arc<RendezvousSlot>) -> Self {
        Self {
            event,
            rendezvous: Some(slot),
        }
    }

    /// Discard without delivery
    pub(crate) fn drop_unhandled(self) {
        if let Some(slot) = self.rendezvous {
            slot.complete(false);
        }
    }
}

/// Verdict of the selection policy for one queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    Take,
    /// Leave it queued
    Skip,
    /// Remove it without delivery
    Discard,
}

#[derive(Debug)]
pub(crate) enum Dequeued {
    Event(Envelope),
    /// Nothing selectable but the state handles `Default`
    Default,
    /// The actor went idle
    Idle,
}

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<Envelope>,
    status: ActorStatus,
}

#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                status: ActorStatus::Uninitialized,
            }),
        }
    }

    /// Append `envelope`. `on_wake` runs under the mailbox lock when the
    /// actor was idle.
    pub(crate) fn enqueue(&self, envelope: Envelope, on_wake: impl FnOnce()) -> EnqueueStatus {
        let mut state = self.state.lock();
        match state.status {
            ActorStatus::Halted => {
                drop(state);
                envelope.drop_unhandled();
                EnqueueStatus::Dropped
            }
            ActorStatus::Idle => {
                state.queue.push_back(envelope);
                state.status = ActorStatus::Running;
                on_wake();
                EnqueueStatus::NeedsWake
            }
            ActorStatus::Uninitialized | ActorStatus::Running => {
                state.queue.push_back(envelope);
                EnqueueStatus::Queued
            }
        }
    }

    /// Mark the actor running. Returns the previous status.
    pub(crate) fn start(&self) -> ActorStatus {
        let mut state = self.state.lock();
        let previous = state.status;
        if matches!(previous, ActorStatus::Uninitialized | ActorStatus::Idle) {
            state.status = ActorStatus::Running;
        }
        previous
    }

    /// Select the next event
    ///
    /// `verdict` is asked about queued events in arrival order until one is
    /// taken. Discarded envelopes are returned to the caller, which completes
    /// their rendezvous outside the lock. When nothing is taken and the state
    /// has no default handler the actor goes idle and `on_idle` runs under the
    /// lock.
    pub(crate) fn dequeue(
        &self,
        mut verdict: impl FnMut(&EventType) -> Selection,
        has_default: bool,
        on_idle: impl FnOnce(),
    ) -> (Dequeued, Vec<Envelope>) {
        let mut state = self.state.lock();
        let mut discarded = Vec::new();

        let mut position = 0;
        while position < state.queue.len() {
            match verdict(state.queue[position].event.event_type()) {
                Selection::Take => {
                    let taken = state.queue.remove(position).map(Dequeued::Event);
                    if let Some(taken) = taken {
                        return (taken, discarded);
                    }
                    break;
                }
                Selection::Skip => position += 1,
                Selection::Discard => {
                    if let Some(envelope) = state.queue.remove(position) {
                        discarded.push(envelope);
                    }
                }
            }
        }

        if has_default {
            return (Dequeued::Default, discarded);
        }

        state.status = ActorStatus::Idle;
        on_idle();
        (Dequeued::Idle, discarded)
    }

    /// Mark halted and drain. Later enqueues are dropped.
    pub(crate) fn halt(&self) -> Vec<Envelope> {
        let mut state = self.state.lock();
        state.status = ActorStatus::Halted;
        state.queue.drain(..).collect()
    }

    pub fn status(&self) -> ActorStatus {
        self.state.lock().status
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn take_all(_: &EventType) -> Selection {
        Selection::Take
    }

    #[test]
    fn test_enqueue_wakes_idle_actor_once() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.start(), ActorStatus::Uninitialized);

        let (dequeued, _) = mailbox.dequeue(take_all, false, || {});
        assert!(matches!(dequeued, Dequeued::Idle));
        assert_eq!(mailbox.status(), ActorStatus::Idle);

        let woken = Cell::new(0);
        let status = mailbox.enqueue(Envelope::new(Event::new("A")), || woken.set(woken.get() + 1));
        assert_eq!(status, EnqueueStatus::NeedsWake);
        let status = mailbox.enqueue(Envelope::new(Event::new("B")), || woken.set(woken.get() + 1));
        assert_eq!(status, EnqueueStatus::Queued);
        assert_eq!(woken.get(), 1);
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn test_skipped_events_stay_queued_in_order() {
        let mailbox = Mailbox::new();
        mailbox.start();
        for tag in ["Deferred", "Noise", "Wanted", "Later"] {
            mailbox.enqueue(Envelope::new(Event::new(tag)), || {});
        }

        let (dequeued, discarded) = mailbox.dequeue(
            |event| match event.as_str() {
                "Deferred" => Selection::Skip,
                "Noise" => Selection::Discard,
                _ => Selection::Take,
            },
            false,
            || {},
        );

        match dequeued {
            Dequeued::Event(envelope) => assert_eq!(envelope.event.event_type().as_str(), "Wanted"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(discarded.len(), 1);
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn test_default_handler_keeps_actor_running() {
        let mailbox = Mailbox::new();
        mailbox.start();
        let idled = Cell::new(false);
        let (dequeued, _) = mailbox.dequeue(take_all, true, || idled.set(true));
        assert!(matches!(dequeued, Dequeued::Default));
        assert!(!idled.get());
        assert_eq!(mailbox.status(), ActorStatus::Running);
    }

    #[test]
    fn test_enqueue_after_halt_completes_rendezvous_with_false() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(Envelope::new(Event::new("A")), || {});
        assert_eq!(mailbox.halt().len(), 1);

        let slot = Arc::new(RendezvousSlot::new(None));
        let status = mailbox.enqueue(
            Envelope::with_rendezvous(Event::new("B"), Arc::clone(&slot)),
            || {},
        );
        assert_eq!(status, EnqueueStatus::Dropped);
        assert_eq!(slot.result(), Some(false));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_rendezvous_completes_once() {
        let slot = RendezvousSlot::new(None);
        slot.complete(true);
        slot.complete(false);
        assert_eq!(slot.result(), Some(true));
        assert_eq!(slot.wait(&SchedulingController::production()), Ok(true));
    }

    #[test]
    fn test_rendezvous_wait_stops_on_termination() {
        let controller = SchedulingController::production();
        controller.terminate(scheduling::ExecutionOutcome::Stopped);
        let slot = RendezvousSlot::new(None);
        assert_eq!(slot.wait(&controller), Err(Canceled));
    }
}
