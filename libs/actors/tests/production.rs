//! Production mode: actors run freely on their own threads

use actors::{
    ActorRuntime, ActorStatus, ConfigurationError, LifecycleRecorder, MachineBuilder, Registry,
    RuntimeError, StateSet, TestingEngine,
};
use runtime_config::Configuration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use types::Event;

fn echo_registry(pings: &Arc<AtomicUsize>) -> Arc<Registry> {
    let counter = Arc::clone(pings);
    let echo = MachineBuilder::new("Echo", move || Arc::clone(&counter))
        .state("Ready", |s| {
            s.initial().on_event("Ping", |pings: &mut Arc<AtomicUsize>, _ctx| {
                pings.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .build()
        .unwrap();
    Arc::new(Registry::builder().register(echo).build().unwrap())
}

#[test]
fn test_production_runtime_processes_all_events() {
    let pings = Arc::new(AtomicUsize::new(0));
    let runtime = ActorRuntime::new(Configuration::default(), echo_registry(&pings)).unwrap();
    assert!(!runtime.is_exploration());
    assert!(runtime.runtime_id().starts_with("runtime-"));

    let echo = runtime.create_actor("Echo", None).unwrap();
    for _ in 0..50 {
        runtime.send(&echo, Event::new("Ping")).unwrap();
    }
    runtime.wait_for_quiescence().unwrap();
    assert_eq!(pings.load(Ordering::SeqCst), 50);
    assert_eq!(runtime.actor_status(&echo), Some(ActorStatus::Idle));

    assert!(runtime.send_and_execute(&echo, Event::new("Ping")).unwrap());
    assert_eq!(pings.load(Ordering::SeqCst), 51);

    runtime.shutdown();
    assert!(runtime.is_canceled());
    assert!(matches!(
        runtime.send(&echo, Event::new("Ping")),
        Err(RuntimeError::ExecutionCanceled)
    ));
}

#[test]
fn test_production_runtime_with_many_senders() {
    let pings = Arc::new(AtomicUsize::new(0));
    let runtime = ActorRuntime::new(Configuration::default(), echo_registry(&pings)).unwrap();
    let echo = runtime.create_actor("Echo", None).unwrap();

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let runtime = runtime.clone();
            let echo = echo.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    runtime.send(&echo, Event::new("Ping")).unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    runtime.wait_for_quiescence().unwrap();
    assert_eq!(pings.load(Ordering::SeqCst), 100);
    runtime.shutdown();
}

#[test]
fn test_production_halt_notifies_observers() {
    let pings = Arc::new(AtomicUsize::new(0));
    let runtime = ActorRuntime::new(Configuration::default(), echo_registry(&pings)).unwrap();
    let recorder = Arc::new(LifecycleRecorder::new());
    runtime.add_observer(recorder.clone());

    let echo = runtime.create_actor("Echo", None).unwrap();
    assert!(!runtime.send_and_execute(&echo, Event::halt()).unwrap());
    runtime.wait_for_quiescence().unwrap();

    assert_eq!(runtime.actor_status(&echo), Some(ActorStatus::Halted));
    assert_eq!(recorder.created(), vec![echo.clone()]);
    assert_eq!(recorder.destroyed(), vec![echo.clone()]);
    assert_eq!(runtime.actors(), vec![echo]);
    runtime.shutdown();
}

#[test]
fn test_production_runtime_rejects_exploration_config() {
    let pings = Arc::new(AtomicUsize::new(0));
    let result = ActorRuntime::new(Configuration::exploration(), echo_registry(&pings));
    assert!(matches!(result, Err(RuntimeError::InvalidOperation(_))));
}

#[test]
fn test_quiescence_is_not_available_in_exploration() {
    let pings = Arc::new(AtomicUsize::new(0));
    let engine = TestingEngine::new(
        Configuration::exploration().with_iterations(1).with_seed(1),
        echo_registry(&pings),
    )
    .unwrap();

    let report = engine
        .run(|rt| {
            let result = rt.wait_for_quiescence();
            rt.assert(
                matches!(result, Err(RuntimeError::InvalidOperation(_))),
                "quiescence wait allowed in exploration",
            )?;
            Ok(())
        })
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);
}

#[test]
fn test_engine_rejects_invalid_configuration() {
    let pings = Arc::new(AtomicUsize::new(0));
    let result = TestingEngine::new(
        Configuration::exploration().with_iterations(0),
        echo_registry(&pings),
    );
    assert!(result.is_err());
}

#[test]
fn test_descriptor_errors_surface_at_build_time() {
    let err = MachineBuilder::new("Broken", || ())
        .state("A", |s| s.initial())
        .state("B", |s| s.initial())
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::MultipleInitialStates {
            actor: "Broken".into(),
            states: vec!["A".into(), "B".into()],
        }
    );

    let err = MachineBuilder::new("Broken", || ())
        .state("A", |s| s.initial().on_goto("Go", "Nowhere"))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownTargetState { .. }));

    let err = MachineBuilder::new("Broken", || ())
        .state("A", |s: actors::StateBuilder<()>| s.on_event("E", |_, _ctx| Ok(())))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::NoInitialState { .. }));
}

#[test]
fn test_inherited_states_run_in_derived_machine() {
    let pings = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pings);
    let base = StateSet::<Arc<AtomicUsize>>::new().state("Ready", |s| {
        s.initial().on_event("Ping", |pings, _ctx| {
            pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    let derived = MachineBuilder::new("Derived", move || Arc::clone(&counter))
        .inherit(&base)
        .build()
        .unwrap();
    let registry = Arc::new(Registry::builder().register(derived).build().unwrap());

    let runtime = ActorRuntime::new(Configuration::default(), registry).unwrap();
    let actor = runtime.create_actor("Derived", None).unwrap();
    assert!(runtime.send_and_execute(&actor, Event::new("Ping")).unwrap());
    assert_eq!(pings.load(Ordering::SeqCst), 1);
    runtime.shutdown();
}
