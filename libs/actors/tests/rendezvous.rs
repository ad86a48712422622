use actors::{ActorRuntime, MachineBuilder, Registry, RuntimeError, TestingEngine};
use runtime_config::Configuration;
use scheduling::BugKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use types::{Event, IdAllocator};

fn engine(registry: Registry, iterations: u32) -> TestingEngine {
    let config = Configuration::exploration()
        .with_iterations(iterations)
        .with_seed(11);
    TestingEngine::new(config, Arc::new(registry)).unwrap()
}

fn server_registry() -> Registry {
    let server = MachineBuilder::new("Server", || ())
        .state("Init", |s| {
            s.initial()
                .on_event("Handled", |_: &mut (), _ctx| Ok(()))
                .ignore("Skipped")
                .on_event("Stop", |_, ctx| {
                    ctx.halt()?;
                    Ok(())
                })
        })
        .build()
        .unwrap();
    Registry::builder().register(server).build().unwrap()
}

#[test]
fn test_send_and_execute_reports_whether_event_was_handled() {
    let report = engine(server_registry(), 20)
        .run(|rt| {
            let server = rt.create_actor("Server", None)?;
            let handled = rt.send_and_execute(&server, Event::new("Handled"))?;
            rt.assert(handled, "handled event reported as unhandled")?;
            let ignored = rt.send_and_execute(&server, Event::new("Skipped"))?;
            rt.assert(!ignored, "ignored event reported as handled")?;
            Ok(())
        })
        .unwrap();

    assert!(report.passed(), "{:?}", report.bug);
}

#[test]
fn test_send_and_execute_is_false_when_target_halts() {
    let report = engine(server_registry(), 20)
        .run(|rt| {
            let server = rt.create_actor("Server", None)?;
            let stopped = rt.send_and_execute(&server, Event::new("Stop"))?;
            rt.assert(!stopped, "halting target reported the event as handled")?;
            let after = rt.send_and_execute(&server, Event::new("Handled"))?;
            rt.assert(!after, "halted target reported the event as handled")?;
            Ok(())
        })
        .unwrap();

    assert!(report.passed(), "{:?}", report.bug);
}

#[test]
fn test_send_and_execute_with_unhandled_event_fails_the_run() {
    let report = engine(server_registry(), 1)
        .run(|rt| {
            let server = rt.create_actor("Server", None)?;
            rt.send_and_execute(&server, Event::new("E"))?;
            Ok(())
        })
        .unwrap();

    let bug = report.bug.unwrap();
    assert_eq!(bug.kind, BugKind::UnhandledEvent);
    assert_eq!(
        bug.message,
        "Machine 'Server(0)' received event 'E' that cannot be handled."
    );
}

#[test]
fn test_create_and_execute_waits_for_first_run() {
    let entered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&entered);
    let machine = MachineBuilder::new("Worker", move || Arc::clone(&counter))
        .state("Init", |s| {
            s.initial().on_entry(|count: &mut Arc<AtomicUsize>, _ctx| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .build()
        .unwrap();
    let registry = Registry::builder().register(machine).build().unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&observed);
    let report = engine(registry, 10)
        .run(move |rt| {
            let before = rt.controller().steps();
            rt.create_and_execute("Worker", None)?;
            rt.assert(rt.controller().steps() > before, "creation did not yield")?;
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert!(report.passed(), "{:?}", report.bug);
    assert_eq!(observed.load(Ordering::SeqCst), 10);
    assert_eq!(entered.load(Ordering::SeqCst), 10);
}

#[test]
fn test_rendezvous_on_deferred_event_deadlocks() {
    let sleeper = MachineBuilder::<()>::new("Sleeper", || ())
        .state("Init", |s| s.initial().defer("Wake"))
        .build()
        .unwrap();
    let registry = Registry::builder().register(sleeper).build().unwrap();

    let report = engine(registry, 1)
        .run(|rt| {
            let sleeper = rt.create_actor("Sleeper", None)?;
            rt.send_and_execute(&sleeper, Event::new("Wake"))?;
            Ok(())
        })
        .unwrap();

    let bug = report.bug.unwrap();
    assert_eq!(bug.kind, BugKind::Deadlock);
    assert!(bug.actor.is_none());
    assert!(bug.message.starts_with("Deadlock detected."));
    assert!(bug.message.contains("test driver"));
}

#[test]
fn test_machines_rendezvous_with_each_other() {
    let caller = MachineBuilder::new("Caller", || ())
        .state("Init", |s| {
            s.initial().on_entry(|_: &mut (), ctx| {
                let callee = ctx.create_actor("Callee", None)?;
                let answered = ctx.send_and_execute(&callee, Event::new("Ask"))?;
                ctx.assert(answered, "callee did not answer")?;
                Ok(())
            })
        })
        .build()
        .unwrap();
    let callee = MachineBuilder::new("Callee", || ())
        .state("Init", |s| s.initial().on_event("Ask", |_: &mut (), _ctx| Ok(())))
        .build()
        .unwrap();
    let registry = Registry::builder()
        .register(caller)
        .register(callee)
        .build()
        .unwrap();

    let report = engine(registry, 20)
        .run(|rt| {
            rt.create_actor("Caller", None)?;
            Ok(())
        })
        .unwrap();

    assert!(report.passed(), "{:?}", report.bug);
}

#[test]
fn test_rendezvous_with_itself_is_an_assertion() {
    let machine = MachineBuilder::new("Narcissus", || ())
        .state("Init", |s| {
            s.initial().on_event("Look", |_: &mut (), ctx| {
                let me = ctx.id().clone();
                ctx.send_and_execute(&me, Event::new("Look"))?;
                Ok(())
            })
        })
        .build()
        .unwrap();
    let registry = Registry::builder().register(machine).build().unwrap();

    let report = engine(registry, 1)
        .run(|rt| {
            let m = rt.create_actor("Narcissus", None)?;
            rt.send(&m, Event::new("Look"))?;
            Ok(())
        })
        .unwrap();

    let bug = report.bug.unwrap();
    assert_eq!(bug.kind, BugKind::AssertionViolation);
    assert_eq!(
        bug.message,
        "Machine 'Narcissus(0)' can not rendezvous with itself."
    );
}

fn send_to_unknown(rt: &ActorRuntime) -> anyhow::Result<()> {
    let ghost = IdAllocator::new(99).create("Ghost", "ghost", true)?;
    match rt.send(&ghost, Event::new("Boo")) {
        Err(RuntimeError::UnknownActor(id)) => {
            rt.assert(id == ghost, "wrong actor in error")?;
            Ok(())
        }
        other => Err(anyhow::anyhow!("unexpected result {:?}", other)),
    }
}

#[test]
fn test_send_to_unknown_actor_is_an_error_not_a_bug() {
    let report = engine(server_registry(), 1).run(send_to_unknown).unwrap();
    assert!(report.passed(), "{:?}", report.bug);
}
