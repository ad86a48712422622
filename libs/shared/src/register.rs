//! Shared Register

use crate::errors::Result;
use actors::ActorRuntime;
use parking_lot::RwLock;
use scheduling::SchedulingPointKind;

/// A single value shared between actors
pub struct SharedRegister<T> {
    runtime: ActorRuntime,
    value: RwLock<T>,
}

impl<T: Clone> SharedRegister<T> {
    pub fn new(runtime: &ActorRuntime, initial: T) -> Self {
        Self {
            runtime: runtime.clone(),
            value: RwLock::new(initial),
        }
    }

    fn access(&self) -> Result<()> {
        self.runtime
            .scheduling_point(SchedulingPointKind::SharedAccess)?;
        Ok(())
    }

    pub fn get(&self) -> Result<T> {
        self.access()?;
        Ok(self.value.read().clone())
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.access()?;
        *self.value.write() = value;
        Ok(())
    }

    /// Replace the value with `update(current)` in one step and return it
    pub fn update<F>(&self, update: F) -> Result<T>
    where
        F: FnOnce(&T) -> T,
    {
        self.access()?;
        let mut value = self.value.write();
        let next = update(&*value);
        *value = next.clone();
        Ok(next)
    }
}

impl<T: Default + Clone> SharedRegister<T> {
    pub fn with_default(runtime: &ActorRuntime) -> Self {
        Self::new(runtime, T::default())
    }
}

impl<T> std::fmt::Debug for SharedRegister<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegister")
            .field("runtime_id", &self.runtime.runtime_id())
            .finish_non_exhaustive()
    }
}
