//! Shared Counter

use crate::errors::Result;
use actors::ActorRuntime;
use scheduling::SchedulingPointKind;
use std::sync::atomic::{AtomicI64, Ordering};

/// Integer counter shared between actors
pub struct SharedCounter {
    runtime: ActorRuntime,
    value: AtomicI64,
}

impl SharedCounter {
    pub fn new(runtime: &ActorRuntime, initial: i64) -> Self {
        Self {
            runtime: runtime.clone(),
            value: AtomicI64::new(initial),
        }
    }

    fn access(&self) -> Result<()> {
        self.runtime
            .scheduling_point(SchedulingPointKind::SharedAccess)?;
        Ok(())
    }

    pub fn increment(&self) -> Result<()> {
        self.access()?;
        self.value.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn decrement(&self) -> Result<()> {
        self.access()?;
        self.value.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Add `delta` and return the new value
    pub fn add(&self, delta: i64) -> Result<i64> {
        self.access()?;
        Ok(self.value.fetch_add(delta, Ordering::SeqCst) + delta)
    }

    pub fn get(&self) -> Result<i64> {
        self.access()?;
        Ok(self.value.load(Ordering::SeqCst))
    }

    /// Store `value` and return the previous one
    pub fn exchange(&self, value: i64) -> Result<i64> {
        self.access()?;
        Ok(self.value.swap(value, Ordering::SeqCst))
    }

    /// Store `value` if the counter equals `expected`. Returns the value seen.
    pub fn compare_exchange(&self, value: i64, expected: i64) -> Result<i64> {
        self.access()?;
        Ok(match self
            .value
            .compare_exchange(expected, value, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(previous) | Err(previous) => previous,
        })
    }
}

impl std::fmt::Debug for SharedCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounter")
            .field("value", &self.value.load(Ordering::SeqCst))
            .finish()
    }
}
