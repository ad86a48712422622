//! State-Machine Actor Runtime
//!
//! Machines are communicating state machines with private data, a FIFO
//! mailbox and a stack of active states. Monitors are specification machines
//! that observe the events machines send and assert global properties. Both
//! are declared once as descriptors and interpreted by the same
//! [`StateMachineCore`].
//!
//! Every send, creation, halt, rendezvous and random choice passes through
//! the runtime's [`SchedulingController`](scheduling::SchedulingController).
//! In production mode the actors simply run. Under the [`TestingEngine`] the
//! controller serializes them and an exploration strategy picks every
//! interleaving, so a failing run can be replayed decision for decision.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐         ┌──────────────────────────┐
//! │  MachineBuilder      │ build   │  Registry                │
//! │  MonitorBuilder      │────────▶│  type tag → descriptor   │
//! └──────────────────────┘         └────────────┬─────────────┘
//!                                               │ instantiate
//! ┌─────────────────────────────────────────────▼─────────────┐
//! │  ActorRuntime                                             │
//! │                                                           │
//! │  ┌───────────────┐  send   ┌───────────┐  Run   ┌──────┐ │
//! │  │ Context       │────────▶│ Mailbox   │───────▶│ Core │ │
//! │  │ (in actions)  │─┐       └───────────┘        └──────┘ │
//! │  └───────────────┘ │ forward ┌──────────────────┐        │
//! │                    └────────▶│ MonitorRegistry  │        │
//! │                              └──────────────────┘        │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               │ scheduling points
//!                    ┌──────────▼───────────┐
//!                    │ SchedulingController │
//!                    └──────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use actors::{ActorRuntime, MachineBuilder, Registry};
//! use runtime_config::Configuration;
//! use std::sync::Arc;
//! use types::Event;
//!
//! #[derive(Default)]
//! struct Echo {
//!     pings: u32,
//! }
//!
//! let echo = MachineBuilder::<Echo>::with_default("Echo")
//!     .state("Ready", |s| {
//!         s.initial().on_event("Ping", |echo, _ctx| {
//!             echo.pings += 1;
//!             Ok(())
//!         })
//!     })
//!     .build()?;
//! let registry = Arc::new(Registry::builder().register(echo).build()?);
//!
//! let runtime = ActorRuntime::new(Configuration::default(), registry)?;
//! let actor = runtime.create_actor("Echo", None)?;
//! assert!(runtime.send_and_execute(&actor, Event::new("Ping"))?);
//! runtime.shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod builder;
pub mod context;
pub mod descriptor;
pub mod errors;
pub mod hooks;
pub mod machine;
pub mod mailbox;
pub mod monitor;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod testing;
pub mod timers;

pub use builder::{MachineBuilder, MonitorBuilder, StateBuilder, StateSet};
pub use context::Context;
pub use descriptor::{ActorDescriptor, ActorKind, StateDescriptor};
pub use errors::{ConfigurationError, Result, RuntimeError};
pub use hooks::{LifecycleEvent, LifecycleObserver, LifecycleRecorder};
pub use machine::StateMachineCore;
pub use mailbox::{ActorStatus, EnqueueStatus, Mailbox};
pub use registry::{Registry, RegistryBuilder};
pub use runtime::{ActorRuntime, DEFAULT_ASSERTION_MESSAGE};
pub use testing::{TestReport, TestingEngine};
pub use timers::{TimerInfo, STOP_TIMER, TIMER_ELAPSED};
