//! # Marionette Core Types
//!
//! Value types shared by every crate in the workspace: actor identities and
//! the events actors exchange.
//!
//! ## Identities
//!
//! An [`ActorId`] is allocated by an [`IdAllocator`] owned by one runtime.
//! Numeric identities come from an atomic counter, named identities hash on
//! their custom name. Every identity carries the allocator's *generation*, so
//! actors created by successive test iterations never compare equal even when
//! the counter hands out the same numbers again.
//!
//! ```rust
//! use types::IdAllocator;
//!
//! let ids = IdAllocator::new(0);
//! let client = ids.create("Client", "", false).unwrap();
//! assert_eq!(client.to_string(), "Client(0)");
//!
//! ids.next_generation();
//! let again = ids.create("Client", "", false).unwrap();
//! assert_eq!(again.value(), client.value());
//! assert_ne!(again, client);
//! ```
//!
//! ## Events
//!
//! An [`Event`] is an immutable `(type, payload)` pair. Payloads are type-erased
//! and shared, so cloning an event is cheap and never copies user data.
//! `Halt` and `Default` are reserved event types understood by the
//! interpreter.

pub mod common;
pub mod events;

pub use common::errors::IdentityError;
pub use common::identifiers::{ActorId, IdAllocator};
pub use events::{Event, EventType, Payload, DEFAULT_EVENT, HALT_EVENT};
