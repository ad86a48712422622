use actors::{ActorRuntime, MachineBuilder, Registry, TestingEngine, TimerInfo, TIMER_ELAPSED};
use parking_lot::Mutex;
use runtime_config::Configuration;
use scheduling::ExecutionOutcome;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Sleeper {
    timer: Option<types::ActorId>,
    ticks: u32,
}

fn sleeper_registry(periodic: bool, fired: Arc<Mutex<Vec<TimerInfo>>>) -> Arc<Registry> {
    let sleeper = MachineBuilder::new("Sleeper", Sleeper::default)
        .state("Waiting", move |s| {
            s.initial()
                .on_entry(move |sleeper: &mut Sleeper, ctx| {
                    sleeper.timer = Some(ctx.start_timer(Duration::from_millis(20), periodic)?);
                    Ok(())
                })
                .on_event(TIMER_ELAPSED, move |sleeper, ctx| {
                    let info = ctx
                        .payload::<TimerInfo>()
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("timer event without info"))?;
                    ctx.assert(Some(&info.timer) == sleeper.timer.as_ref(), "foreign timer")?;
                    ctx.assert(&info.owner == ctx.id(), "timer fired at the wrong owner")?;
                    fired.lock().push(info);

                    sleeper.ticks += 1;
                    if periodic && sleeper.ticks == 3 {
                        if let Some(timer) = sleeper.timer.clone() {
                            ctx.stop_timer(&timer)?;
                        }
                    }
                    Ok(())
                })
        })
        .build()
        .unwrap();
    Arc::new(Registry::builder().register(sleeper).build().unwrap())
}

fn start_sleeper(rt: &ActorRuntime) -> anyhow::Result<()> {
    rt.create_actor("Sleeper", None)?;
    Ok(())
}

#[test]
fn test_one_shot_mock_timer_fires_once() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let config = Configuration::exploration().with_iterations(10).with_seed(17);
    let engine = TestingEngine::new(config, sleeper_registry(false, Arc::clone(&fired))).unwrap();

    let report = engine.run(start_sleeper).unwrap();

    assert!(report.passed(), "{:?}", report.bug);
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| *outcome == ExecutionOutcome::Quiescent));
    let fired = fired.lock();
    assert_eq!(fired.len(), 10);
    assert!(fired.iter().all(|info| !info.periodic));
    assert!(fired.iter().all(|info| info.period == Duration::from_millis(20)));
}

#[test]
fn test_periodic_mock_timer_stops_on_request() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let config = Configuration::exploration()
        .with_iterations(5)
        .with_max_steps(50_000)
        .with_seed(23);
    let engine = TestingEngine::new(config, sleeper_registry(true, Arc::clone(&fired))).unwrap();

    let report = engine.run(start_sleeper).unwrap();

    assert!(report.passed(), "{:?}", report.bug);
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| *outcome == ExecutionOutcome::Quiescent));
    assert!(fired.lock().len() >= 15);
}

#[test]
fn test_production_timer_sleeps_and_fires() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let runtime = ActorRuntime::new(
        Configuration::default(),
        sleeper_registry(false, Arc::clone(&fired)),
    )
    .unwrap();

    let started = Instant::now();
    runtime.create_actor("Sleeper", None).unwrap();
    while fired.lock().is_empty() && started.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(fired.lock().len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(20));
    runtime.shutdown();
    assert!(runtime.bug().is_none());
}
