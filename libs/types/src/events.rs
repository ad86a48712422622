//! # Events
//!
//! Events are the only thing actors exchange. An event is an immutable
//! `(type, payload)` pair; handlers are bound to the event *type*, the payload
//! is read back with [`Event::payload_as`].
//!
//! Two event types are reserved:
//!
//! - [`HALT_EVENT`]: when no state on the stack handles it, the actor halts.
//! - [`DEFAULT_EVENT`]: synthesized by the interpreter when the mailbox has
//!   nothing selectable and the current state binds `Default`.

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Reserved type of the halt event
pub const HALT_EVENT: &str = "Halt";

/// Reserved type of the synthetic default event
pub const DEFAULT_EVENT: &str = "Default";

/// Event type tag
///
/// Backed by a shared string so that transition tables and mailboxes can hold
/// many copies without allocating.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(Arc<str>);

impl EventType {
    pub fn new(tag: &str) -> Self {
        Self(Arc::from(tag))
    }

    pub fn halt() -> Self {
        Self::new(HALT_EVENT)
    }

    pub fn default_event() -> Self {
        Self::new(DEFAULT_EVENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_halt(&self) -> bool {
        &*self.0 == HALT_EVENT
    }

    pub fn is_default(&self) -> bool {
        &*self.0 == DEFAULT_EVENT
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self(Arc::from(tag))
    }
}

impl Borrow<str> for EventType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", &self.0)
    }
}

/// Type-erased, shared event payload
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload as `T`, `None` if it holds another type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// An immutable event
#[derive(Debug, Clone)]
pub struct Event {
    event_type: EventType,
    payload: Option<Payload>,
}

impl Event {
    /// Event without payload
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: None,
        }
    }

    /// Event carrying `payload`
    pub fn with_payload<T: Any + Send + Sync>(event_type: impl Into<EventType>, payload: T) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Some(Payload::new(payload)),
        }
    }

    pub fn halt() -> Self {
        Self::new(EventType::halt())
    }

    pub fn default_event() -> Self {
        Self::new(EventType::default_event())
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Borrow the payload as `T`
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|payload| payload.downcast_ref::<T>())
    }

    pub fn is_halt(&self) -> bool {
        self.event_type.is_halt()
    }
}

impl Default for Event {
    /// The synthetic `Default` event
    fn default() -> Self {
        Self::default_event()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.event_type, f)
    }
}
