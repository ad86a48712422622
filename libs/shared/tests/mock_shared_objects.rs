//! Shared objects under the testing engine: every access is an explored
//! interleaving point

use actors::{ActorRuntime, MachineBuilder, Registry, TestingEngine, DEFAULT_ASSERTION_MESSAGE};
use runtime_config::Configuration;
use scheduling::BugKind;
use shared_objects::{SharedCounter, SharedDictionary, SharedRegister};
use std::sync::Arc;
use types::{ActorId, Event};

type Dictionary = Arc<SharedDictionary<i32, String>>;

fn dictionary_of(payload: Option<&Dictionary>) -> anyhow::Result<Dictionary> {
    payload
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing dictionary payload"))
}

fn engine(registry: Registry) -> TestingEngine {
    let config = Configuration::exploration().with_iterations(50).with_seed(101);
    TestingEngine::new(config, Arc::new(registry)).unwrap()
}

/// Machines that each run one closure in their entry action
fn entry_machine<F>(tag: &str, entry: F) -> actors::ActorDescriptor
where
    F: Fn(&mut actors::Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    MachineBuilder::new(tag, || ())
        .state("Init", move |s| s.initial().on_entry(move |_: &mut (), ctx| entry(ctx)))
        .build()
        .unwrap()
}

fn updater() -> actors::ActorDescriptor {
    entry_machine("Updater", |ctx| {
        let dict = dictionary_of(ctx.payload::<Dictionary>())?;
        dict.try_update(&1, "N".to_string(), &"M".to_string())?;
        Ok(())
    })
}

#[test]
fn test_concurrent_update_is_observed() {
    let owner = entry_machine("Owner", |ctx| {
        let dict: Dictionary = Arc::new(SharedDictionary::new(ctx.runtime()));
        ctx.create_actor("Updater", Some(Event::with_payload("Share", Arc::clone(&dict))))?;
        dict.try_add(1, "M".to_string())?;
        let value = dict.get(&1)?;
        ctx.assert(value == "M", DEFAULT_ASSERTION_MESSAGE)?;
        Ok(())
    });
    let registry = Registry::builder()
        .register(owner)
        .register(updater())
        .build()
        .unwrap();

    let report = engine(registry)
        .run(|rt| {
            rt.create_actor("Owner", None)?;
            Ok(())
        })
        .unwrap();

    let bug = report.bug.expect("interleaved update must be found");
    assert_eq!(bug.kind, BugKind::AssertionViolation);
    assert_eq!(bug.message, "Detected an assertion failure.");
}

#[test]
fn test_missing_key_is_an_action_fault() {
    let owner = entry_machine("Owner", |ctx| {
        let dict: SharedDictionary<i32, String> = SharedDictionary::new(ctx.runtime());
        dict.try_add(1, "M".to_string())?;
        dict.get(&2)?;
        Ok(())
    });
    let registry = Registry::builder().register(owner).build().unwrap();

    let report = engine(registry)
        .run(|rt| {
            rt.create_actor("Owner", None)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(report.iterations, 1);
    let bug = report.bug.unwrap();
    assert_eq!(bug.kind, BugKind::ActionFault);
    assert!(bug.message.starts_with(
        "Exception 'Key 2 was not found in the shared dictionary' was thrown in machine 'Owner(0)', state 'Init'."
    ));
}

#[test]
fn test_count_is_stable_under_updates() {
    let owner = entry_machine("Owner", |ctx| {
        let dict: Dictionary = Arc::new(SharedDictionary::new(ctx.runtime()));
        ctx.create_actor("Updater", Some(Event::with_payload("Share", Arc::clone(&dict))))?;
        dict.try_add(1, "M".to_string())?;
        dict.get(&1)?;
        ctx.assert(dict.count()? == 1, DEFAULT_ASSERTION_MESSAGE)?;
        Ok(())
    });
    let registry = Registry::builder()
        .register(owner)
        .register(updater())
        .build()
        .unwrap();

    let report = engine(registry)
        .run(|rt| {
            rt.create_actor("Owner", None)?;
            Ok(())
        })
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);
    assert_eq!(report.iterations, 50);
}

#[test]
fn test_concurrent_removes() {
    let owner = entry_machine("Owner", |ctx| {
        let dict: Dictionary = Arc::new(SharedDictionary::new(ctx.runtime()));
        ctx.create_actor("Remover", Some(Event::with_payload("Share", Arc::clone(&dict))))?;
        dict.try_add(1, "M".to_string())?;
        let removed = dict.try_remove(&1)?;
        ctx.assert(removed.map_or(true, |v| v == "M"), DEFAULT_ASSERTION_MESSAGE)?;
        ctx.assert(dict.count()? == 0, DEFAULT_ASSERTION_MESSAGE)?;
        Ok(())
    });
    let remover = entry_machine("Remover", |ctx| {
        let dict = dictionary_of(ctx.payload::<Dictionary>())?;
        let removed = dict.try_remove(&1)?;
        ctx.assert(removed.map_or(true, |v| v == "M"), DEFAULT_ASSERTION_MESSAGE)?;
        Ok(())
    });
    let registry = Registry::builder()
        .register(owner)
        .register(remover)
        .build()
        .unwrap();

    let report = engine(registry)
        .run(|rt| {
            rt.create_actor("Owner", None)?;
            Ok(())
        })
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);
}

fn reader_registry() -> Registry {
    // Payload: the dictionary and whether to spawn a writer of key 2
    let reader = entry_machine("Reader", |ctx| {
        let (dict, spawn_writer) = ctx
            .payload::<(Dictionary, bool)>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing payload"))?;
        dict.try_add(1, "M".to_string())?;
        if spawn_writer {
            ctx.create_actor("Writer", Some(Event::with_payload("Share", Arc::clone(&dict))))?;
        }
        let seen = dict.try_get(&2)?;
        if !spawn_writer {
            ctx.assert(seen.is_none(), DEFAULT_ASSERTION_MESSAGE)?;
        }
        if let Some(value) = seen {
            ctx.assert(value == "N", DEFAULT_ASSERTION_MESSAGE)?;
        }
        Ok(())
    });
    let writer = entry_machine("Writer", |ctx| {
        let dict = dictionary_of(ctx.payload::<Dictionary>())?;
        let first = dict.try_get(&1)?;
        ctx.assert(first.as_deref() == Some("M"), DEFAULT_ASSERTION_MESSAGE)?;
        dict.try_add(2, "N".to_string())?;
        Ok(())
    });
    Registry::builder()
        .register(reader)
        .register(writer)
        .build()
        .unwrap()
}

fn start_reader(rt: &ActorRuntime, spawn_writer: bool) -> anyhow::Result<()> {
    let dict: Dictionary = Arc::new(SharedDictionary::new(rt));
    rt.create_actor("Reader", Some(Event::with_payload("Start", (dict, spawn_writer))))?;
    Ok(())
}

#[test]
fn test_dictionary_created_by_test_driver() {
    let report = engine(reader_registry())
        .run(|rt| start_reader(rt, true))
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);

    let report = engine(reader_registry())
        .run(|rt| start_reader(rt, false))
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);
}

#[test]
fn test_racing_insert_is_found() {
    let owner = entry_machine("Owner", |ctx| {
        let dict = dictionary_of(ctx.payload::<Dictionary>())?;
        ctx.create_actor("Inserter", Some(Event::with_payload("Share", Arc::clone(&dict))))?;
        dict.try_add(1, "M".to_string())?;
        let seen = dict.try_get(&2)?;
        ctx.assert(seen.is_none(), DEFAULT_ASSERTION_MESSAGE)?;
        Ok(())
    });
    let inserter = entry_machine("Inserter", |ctx| {
        let dict = dictionary_of(ctx.payload::<Dictionary>())?;
        dict.try_add(2, "N".to_string())?;
        Ok(())
    });
    let registry = Registry::builder()
        .register(owner)
        .register(inserter)
        .build()
        .unwrap();

    let report = engine(registry)
        .run(|rt| {
            let dict: Dictionary = Arc::new(SharedDictionary::new(rt));
            rt.create_actor("Owner", Some(Event::with_payload("Start", dict)))?;
            Ok(())
        })
        .unwrap();

    let bug = report.bug.expect("racing insert must be found");
    assert_eq!(bug.message, "Detected an assertion failure.");
}

type Slot = Arc<SharedRegister<u32>>;

/// Two workers bump a register, the checker asserts no update was lost
fn increment_registry(atomic: bool) -> Registry {
    let worker = entry_machine("Worker", move |ctx| {
        let (slot, checker) = ctx
            .payload::<(Slot, ActorId)>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing payload"))?;
        if atomic {
            slot.update(|value| value + 1)?;
        } else {
            let value = slot.get()?;
            slot.set(value + 1)?;
        }
        ctx.send(&checker, Event::with_payload("Done", slot))?;
        Ok(())
    });
    let checker = MachineBuilder::new("Checker", || 0u32)
        .state("Init", |s| {
            s.initial().on_event("Done", |done: &mut u32, ctx| {
                *done += 1;
                let slot = ctx.payload::<Slot>().cloned();
                if let (2, Some(slot)) = (*done, slot) {
                    ctx.assert(slot.get()? == 2, "lost update")?;
                }
                Ok(())
            })
        })
        .build()
        .unwrap();
    Registry::builder()
        .register(worker)
        .register(checker)
        .build()
        .unwrap()
}

fn increment_test(rt: &ActorRuntime) -> anyhow::Result<()> {
    let slot: Slot = Arc::new(SharedRegister::new(rt, 0));
    let checker = rt.create_actor("Checker", None)?;
    for _ in 0..2 {
        rt.create_actor(
            "Worker",
            Some(Event::with_payload("Start", (Arc::clone(&slot), checker.clone()))),
        )?;
    }
    Ok(())
}

#[test]
fn test_read_then_write_loses_updates() {
    let report = engine(increment_registry(false)).run(increment_test).unwrap();

    let bug = report.bug.expect("lost update must be found");
    assert_eq!(bug.kind, BugKind::AssertionViolation);
    assert_eq!(bug.message, "lost update");
    assert_eq!(bug.actor.map(|id| id.to_string()), Some("Checker(0)".to_string()));
}

#[test]
fn test_atomic_update_is_safe() {
    let report = engine(increment_registry(true)).run(increment_test).unwrap();
    assert!(report.passed(), "{:?}", report.bug);
    assert_eq!(report.iterations, 50);
}

#[test]
fn test_counter_increments_are_never_lost() {
    let bumper = entry_machine("Bumper", |ctx| {
        let counter = ctx
            .payload::<Arc<SharedCounter>>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing counter"))?;
        counter.increment()?;
        let seen = counter.get()?;
        ctx.assert((1..=3).contains(&seen), "counter out of range")?;
        Ok(())
    });
    let registry = Registry::builder().register(bumper).build().unwrap();

    let report = engine(registry)
        .run(|rt| {
            let counter = Arc::new(SharedCounter::new(rt, 0));
            for _ in 0..3 {
                rt.create_actor("Bumper", Some(Event::with_payload("Start", Arc::clone(&counter))))?;
            }
            Ok(())
        })
        .unwrap();
    assert!(report.passed(), "{:?}", report.bug);
}
