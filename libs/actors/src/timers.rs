//! Timers
//!
//! A timer is an ordinary machine created on behalf of its owner. It sends
//! [`TIMER_ELAPSED`] events carrying a [`TimerInfo`] payload until it receives
//! [`STOP_TIMER`] or, for a one-shot timer, after the first firing.
//!
//! In exploration mode the timer never sleeps. Its `Default` handler asks the
//! controller for a nondeterministic boolean and fires when it comes up
//! `true`, so whether and when a timeout happens is part of the explored
//! interleaving. In production mode the timer machine spawns a sleeper thread
//! that fires after each period.

use crate::builder::MachineBuilder;
use crate::context::Context;
use crate::descriptor::ActorDescriptor;
use crate::errors::{ConfigurationError, Result};
use crate::runtime::ActorRuntime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use types::{ActorId, Event, DEFAULT_EVENT};

/// Type tag of the explored timer machine
pub const TIMER_TYPE: &str = "marionette::Timer";

/// Type tag of the sleeping timer machine used in production mode
pub const PRODUCTION_TIMER_TYPE: &str = "marionette::ProductionTimer";

/// Sent to the owner each time the timer fires
pub const TIMER_ELAPSED: &str = "TimerElapsed";

/// Sent to a timer to stop it
pub const STOP_TIMER: &str = "StopTimer";

const TIMER_SETUP: &str = "marionette::TimerSetup";

/// Longest uninterrupted sleep of a production timer
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Payload of `TimerElapsed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    pub timer: ActorId,
    pub owner: ActorId,
    pub period: Duration,
    pub periodic: bool,
}

#[derive(Debug)]
struct TimerSetup {
    owner: ActorId,
    period: Duration,
    periodic: bool,
}

fn setup_info(ctx: &Context<'_>) -> anyhow::Result<TimerInfo> {
    let setup = ctx
        .payload::<TimerSetup>()
        .ok_or_else(|| anyhow::anyhow!("timer {} was created without a setup payload", ctx.id()))?;
    Ok(TimerInfo {
        timer: ctx.id().clone(),
        owner: setup.owner.clone(),
        period: setup.period,
        periodic: setup.periodic,
    })
}

fn elapsed(info: &TimerInfo) -> Event {
    Event::with_payload(TIMER_ELAPSED, info.clone())
}

#[derive(Default)]
struct MockTimer {
    info: Option<TimerInfo>,
}

#[derive(Default)]
struct SleepingTimer {
    stop: Arc<AtomicBool>,
}

/// Descriptors of the built-in timer machines
pub(crate) fn descriptors() -> std::result::Result<Vec<ActorDescriptor>, ConfigurationError> {
    let mock = MachineBuilder::<MockTimer>::with_default(TIMER_TYPE)
        .state("Active", |s| {
            s.initial()
                .on_entry(|timer, ctx| {
                    timer.info = Some(setup_info(ctx)?);
                    Ok(())
                })
                .on_event(DEFAULT_EVENT, |timer, ctx| {
                    let Some(info) = timer.info.clone() else {
                        return Ok(());
                    };
                    if ctx.random_bool()? {
                        debug!(timer = %info.timer, owner = %info.owner, "Timer fired");
                        ctx.send(&info.owner, elapsed(&info))?;
                        if !info.periodic {
                            ctx.halt()?;
                        }
                    }
                    Ok(())
                })
                .on_event(STOP_TIMER, |_, ctx| {
                    ctx.halt()?;
                    Ok(())
                })
        })
        .build()?;

    let sleeping = MachineBuilder::<SleepingTimer>::with_default(PRODUCTION_TIMER_TYPE)
        .state("Active", |s| {
            s.initial()
                .on_entry(|timer, ctx| {
                    let info = setup_info(ctx)?;
                    let runtime = ctx.runtime().clone();
                    let stop = Arc::clone(&timer.stop);
                    let name = format!("timer-{}", info.timer);
                    ctx.runtime()
                        .spawn_thread(name, move || sleep_and_fire(runtime, info, stop))?;
                    Ok(())
                })
                .on_event(STOP_TIMER, |timer, ctx| {
                    timer.stop.store(true, Ordering::SeqCst);
                    ctx.halt()?;
                    Ok(())
                })
        })
        .build()?;

    Ok(vec![mock, sleeping])
}

fn sleep_and_fire(runtime: ActorRuntime, info: TimerInfo, stop: Arc<AtomicBool>) {
    loop {
        let deadline = Instant::now() + info.period;
        loop {
            if stop.load(Ordering::SeqCst) || runtime.is_canceled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }

        debug!(timer = %info.timer, owner = %info.owner, "Timer fired");
        if !deliver(&runtime, &info.owner, elapsed(&info)) {
            return;
        }
        if !info.periodic {
            break;
        }
    }

    // One-shot timers halt once they fired
    deliver(&runtime, &info.timer, Event::halt());
}

/// Send from the sleeper thread. A failed send means the run stopped or the
/// target is gone, so the sleeper just ends.
fn deliver(runtime: &ActorRuntime, target: &ActorId, event: Event) -> bool {
    let event_type = event.event_type().clone();
    match runtime.send(target, event) {
        Ok(()) => true,
        Err(error) => {
            trace!(target_actor = %target, event = %event_type, error = %error, "Timer send dropped");
            false
        }
    }
}

/// Create a timer owned by `owner`
pub(crate) fn start(
    runtime: &ActorRuntime,
    owner: &ActorId,
    period: Duration,
    periodic: bool,
) -> Result<ActorId> {
    let type_tag = if runtime.is_exploration() {
        TIMER_TYPE
    } else {
        PRODUCTION_TIMER_TYPE
    };
    let setup = TimerSetup {
        owner: owner.clone(),
        period,
        periodic,
    };
    runtime.create_actor(type_tag, Some(Event::with_payload(TIMER_SETUP, setup)))
}

pub(crate) fn stop(runtime: &ActorRuntime, timer: &ActorId) -> Result<()> {
    runtime.send(timer, Event::new(STOP_TIMER))
}
