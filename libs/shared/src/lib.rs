//! # Mock Shared Objects
//!
//! Data structures actors may share directly instead of exchanging events.
//! Every access is a `SharedAccess` scheduling point, so under the testing
//! engine the order in which actors touch shared state is explored like any
//! other interleaving. In production mode the scheduling point returns
//! immediately and the objects behave like ordinary concurrent containers.
//!
//! Objects are created against a runtime and handed to actors inside event
//! payloads:
//!
//! ```rust
//! use actors::{ActorRuntime, Registry};
//! use runtime_config::Configuration;
//! use shared_objects::SharedCounter;
//! use std::sync::Arc;
//!
//! let runtime = ActorRuntime::new(Configuration::default(), Arc::new(Registry::builder().build()?))?;
//! let counter = Arc::new(SharedCounter::new(&runtime, 0));
//! counter.increment()?;
//! assert_eq!(counter.get()?, 1);
//! runtime.shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod counter;
pub mod dictionary;
pub mod errors;
pub mod register;

pub use counter::SharedCounter;
pub use dictionary::SharedDictionary;
pub use errors::{Result, SharedError};
pub use register::SharedRegister;
