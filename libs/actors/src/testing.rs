//! Testing Engine
//!
//! Runs a test closure many times under an exploration strategy. Each
//! iteration gets a fresh exploration runtime and a new identity generation;
//! the closure runs as operation 0 (the test driver) and the iteration ends
//! when the controller decides the outcome. The engine stops at the first
//! bug, whose trace can be handed to [`TestingEngine::replay`] to reproduce it.
//!
//! ```no_run
//! use actors::{MachineBuilder, Registry, TestingEngine};
//! use runtime_config::Configuration;
//! use std::sync::Arc;
//! use types::Event;
//!
//! #[derive(Default)]
//! struct Counter {
//!     seen: u32,
//! }
//!
//! let counter = MachineBuilder::<Counter>::with_default("Counter")
//!     .state("Counting", |s| {
//!         s.initial().on_event("Tick", |counter, ctx| {
//!             counter.seen += 1;
//!             ctx.assert(counter.seen < 3, "counted too far")?;
//!             Ok(())
//!         })
//!     })
//!     .build()?;
//! let registry = Arc::new(Registry::builder().register(counter).build()?);
//!
//! let engine = TestingEngine::new(Configuration::exploration().with_seed(1), registry)?;
//! let report = engine.run(|rt| {
//!     let counter = rt.create_actor("Counter", None)?;
//!     for _ in 0..3 {
//!         rt.send(&counter, Event::new("Tick"))?;
//!     }
//!     Ok(())
//! })?;
//! assert!(report.bug.is_some());
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::errors::RuntimeError;
use crate::hooks::LifecycleObserver;
use crate::machine::panic_message;
use crate::registry::Registry;
use crate::runtime::ActorRuntime;
use anyhow::{Context as _, Result};
use runtime_config::{Configuration, StrategyKind};
use scheduling::{
    set_current_operation, BugKind, BugReport, ExecutionOutcome, ExecutionTrace,
    ExplorationStrategy, PctStrategy, RandomStrategy, ReplayStrategy, SchedulingController,
    SchedulingPointKind, DRIVER_OPERATION,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};
use types::IdAllocator;

/// Name of the thread that runs the test closure
pub const DRIVER_THREAD: &str = "marionette-test-driver";

type TestFn = dyn Fn(&ActorRuntime) -> Result<()> + Send + Sync;

/// Summary of an engine run
#[derive(Debug, Clone)]
pub struct TestReport {
    /// Iterations actually run
    pub iterations: u32,
    /// First bug found, with its trace
    pub bug: Option<BugReport>,
    /// Outcome of every iteration, in order
    pub outcomes: Vec<ExecutionOutcome>,
    pub strategy: &'static str,
    /// Seed of the random or PCT strategy
    pub seed: Option<u64>,
}

impl TestReport {
    /// No bug and no divergence
    pub fn passed(&self) -> bool {
        self.bug.is_none()
            && !self
                .outcomes
                .iter()
                .any(|outcome| matches!(outcome, ExecutionOutcome::Diverged(_)))
    }
}

pub struct TestingEngine {
    configuration: Configuration,
    registry: Arc<Registry>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl TestingEngine {
    pub fn new(configuration: Configuration, registry: Arc<Registry>) -> Result<Self> {
        configuration
            .validate()
            .context("Invalid testing configuration")?;
        Ok(Self {
            configuration,
            registry,
            observers: Vec::new(),
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Attach `observer` to the runtime of every iteration
    pub fn add_observer(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    /// Explore `test` with the configured strategy
    pub fn run<F>(&self, test: F) -> Result<TestReport>
    where
        F: Fn(&ActorRuntime) -> Result<()> + Send + Sync + 'static,
    {
        let (strategy, seed, iterations) = self.strategy()?;
        self.explore(strategy, seed, iterations, Arc::new(test))
    }

    /// Run `test` once, feeding it the decisions recorded in `trace`
    pub fn replay<F>(&self, trace: ExecutionTrace, test: F) -> Result<TestReport>
    where
        F: Fn(&ActorRuntime) -> Result<()> + Send + Sync + 'static,
    {
        self.explore(Box::new(ReplayStrategy::new(trace)), None, 1, Arc::new(test))
    }

    fn strategy(&self) -> Result<(Box<dyn ExplorationStrategy>, Option<u64>, u32)> {
        let scheduling = &self.configuration.scheduling;
        let seed = scheduling.seed.unwrap_or_else(rand::random);

        Ok(match scheduling.strategy {
            StrategyKind::Random => (
                Box::new(RandomStrategy::new(seed)) as Box<dyn ExplorationStrategy>,
                Some(seed),
                scheduling.iterations,
            ),
            StrategyKind::Pct => (
                Box::new(PctStrategy::new(seed, scheduling.pct_change_points)) as Box<dyn ExplorationStrategy>,
                Some(seed),
                scheduling.iterations,
            ),
            StrategyKind::Replay => {
                let path = scheduling
                    .replay_trace
                    .as_deref()
                    .context("Replay strategy requires scheduling.replay_trace")?;
                let trace = ExecutionTrace::load(path)
                    .with_context(|| format!("Failed to load trace {}", path.display()))?;
                (Box::new(ReplayStrategy::new(trace)) as Box<dyn ExplorationStrategy>, None, 1)
            }
        })
    }

    fn explore(
        &self,
        mut strategy: Box<dyn ExplorationStrategy>,
        seed: Option<u64>,
        iterations: u32,
        test: Arc<TestFn>,
    ) -> Result<TestReport> {
        let name = strategy.name();
        let max_steps = self.configuration.scheduling.max_steps;
        info!(strategy = name, seed = ?seed, iterations, max_steps, "Starting exploration");

        let ids = Arc::new(IdAllocator::new(self.configuration.runtime.generation));
        let mut outcomes = Vec::new();
        let mut bug = None;

        for iteration in 0..iterations {
            if !strategy.prepare_iteration(iteration) {
                break;
            }
            if iteration > 0 {
                ids.next_generation();
            }

            let controller = Arc::new(SchedulingController::exploration(strategy, max_steps));
            let runtime = ActorRuntime::with_controller(
                self.configuration.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&ids),
                Arc::clone(&controller),
            );
            for observer in &self.observers {
                runtime.add_observer(Arc::clone(observer));
            }

            let driver = {
                let runtime = runtime.clone();
                let test = Arc::clone(&test);
                thread::Builder::new()
                    .name(DRIVER_THREAD.to_string())
                    .spawn(move || drive_test(runtime, test))
                    .context("Failed to spawn the test driver")?
            };

            let outcome = controller.wait_for_outcome();
            if driver.join().is_err() {
                warn!(iteration, "Test driver thread panicked");
            }
            runtime.shutdown();
            strategy = controller
                .take_strategy()
                .context("Controller did not hand back its strategy")?;

            debug!(
                iteration,
                generation = ids.generation(),
                steps = controller.steps(),
                outcome = %outcome,
                "Iteration finished"
            );
            outcomes.push(outcome.clone());

            match outcome {
                ExecutionOutcome::BugFound(report) => {
                    if let Some(path) = &self.configuration.trace_output {
                        report
                            .trace
                            .save(path)
                            .with_context(|| format!("Failed to write trace {}", path.display()))?;
                        info!(path = %path.display(), steps = report.trace.len(), "Wrote failing trace");
                    }
                    bug = Some(report);
                    break;
                }
                ExecutionOutcome::Diverged(reason) => {
                    warn!(iteration, reason = %reason, "Replay diverged");
                    break;
                }
                _ => {}
            }
        }

        let report = TestReport {
            iterations: outcomes.len() as u32,
            bug,
            outcomes,
            strategy: name,
            seed,
        };
        info!(
            strategy = name,
            iterations = report.iterations,
            passed = report.passed(),
            "Exploration finished"
        );
        Ok(report)
    }
}

/// Body of the test driver thread
fn drive_test(runtime: ActorRuntime, test: Arc<TestFn>) {
    set_current_operation(Some(DRIVER_OPERATION));
    let result = panic::catch_unwind(AssertUnwindSafe(|| test(&runtime)));

    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(error)) => {
            let signalled = error
                .downcast_ref::<RuntimeError>()
                .is_some_and(RuntimeError::is_termination);
            (!signalled && !runtime.is_canceled()).then(|| format!("{:#}", error))
        }
        Err(panic) => (!runtime.is_canceled()).then(|| panic_message(panic.as_ref())),
    };

    if let Some(message) = failure {
        runtime.report_bug(BugReport::new(
            BugKind::ActionFault,
            format!("Exception '{}' was thrown in the test driver.", message),
            None,
        ));
    }

    runtime
        .controller()
        .complete(DRIVER_OPERATION, SchedulingPointKind::Yield);
    set_current_operation(None);
}
