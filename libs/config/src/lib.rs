//! # Marionette Configuration
//!
//! One [`Configuration`] value drives a runtime or a testing engine. It can be
//! built in code:
//!
//! ```rust
//! use runtime_config::{Configuration, StrategyKind};
//!
//! let config = Configuration::exploration()
//!     .with_iterations(200)
//!     .with_max_steps(5_000)
//!     .with_seed(7)
//!     .with_strategy(StrategyKind::Pct);
//! assert!(config.validate().is_ok());
//! ```
//!
//! or loaded from a TOML file with `MARIONETTE_` environment overrides, see
//! [`Configuration::load`].
//!
//! ## Sections
//!
//! - **scheduling**: production vs. exploration mode, strategy, iteration and
//!   step bounds, seed
//! - **runtime**: event dequeue policy and the starting identity generation
//! - **logging**: filter directive and ANSI output, consumed by [`logging::init`]

pub mod logging;
pub mod settings;

pub use settings::{
    Configuration, DequeuePolicy, LoggingConfig, RuntimeSettings, SchedulingConfig,
    SchedulingMode, StrategyKind, ENV_PREFIX,
};
