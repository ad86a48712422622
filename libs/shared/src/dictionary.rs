//! Shared Dictionary

use crate::errors::{Result, SharedError};
use actors::ActorRuntime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use scheduling::SchedulingPointKind;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::trace;

/// Concurrent map shared between actors
///
/// Each operation first passes a `SharedAccess` scheduling point and then
/// applies its update under the owning shard lock, so in exploration mode
/// every pair of accesses can be interleaved but none is ever torn.
pub struct SharedDictionary<K, V> {
    runtime: ActorRuntime,
    entries: DashMap<K, V>,
}

impl<K, V> SharedDictionary<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(runtime: &ActorRuntime) -> Self {
        Self {
            runtime: runtime.clone(),
            entries: DashMap::new(),
        }
    }

    fn access(&self, operation: &'static str) -> Result<()> {
        self.runtime
            .scheduling_point(SchedulingPointKind::SharedAccess)?;
        trace!(operation, "Shared dictionary access");
        Ok(())
    }

    /// Insert unless `key` is present. Returns whether the value was added.
    pub fn try_add(&self, key: K, value: V) -> Result<bool> {
        self.access("try_add")?;
        match self.entries.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    /// Replace the value of `key` with `value` if it currently equals
    /// `expected`
    pub fn try_update(&self, key: &K, value: V, expected: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        self.access("try_update")?;
        match self.entries.get_mut(key) {
            Some(mut current) if *current == *expected => {
                *current = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn try_get(&self, key: &K) -> Result<Option<V>> {
        self.access("try_get")?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    /// Value of `key`, failing with `KeyNotFound` when absent
    pub fn get(&self, key: &K) -> Result<V> {
        self.try_get(key)?
            .ok_or_else(|| SharedError::key_not_found(key))
    }

    /// Insert or overwrite
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.access("set")?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn try_remove(&self, key: &K) -> Result<Option<V>> {
        self.access("try_remove")?;
        Ok(self.entries.remove(key).map(|(_, value)| value))
    }

    pub fn count(&self) -> Result<usize> {
        self.access("count")?;
        Ok(self.entries.len())
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for SharedDictionary<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDictionary")
            .field("runtime_id", &self.runtime.runtime_id())
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::production_runtime;

    #[test]
    fn test_dictionary_operations() {
        let runtime = production_runtime();
        let dict = SharedDictionary::new(&runtime);

        assert!(dict.try_add(1, "M".to_string()).unwrap());
        assert!(!dict.try_add(1, "X".to_string()).unwrap());
        assert_eq!(dict.get(&1).unwrap(), "M");
        assert_eq!(dict.count().unwrap(), 1);

        assert!(!dict.try_update(&1, "N".to_string(), &"X".to_string()).unwrap());
        assert!(dict.try_update(&1, "N".to_string(), &"M".to_string()).unwrap());
        assert_eq!(dict.try_get(&1).unwrap().as_deref(), Some("N"));
        assert!(!dict.try_update(&2, "N".to_string(), &"M".to_string()).unwrap());

        dict.set(2, "O".to_string()).unwrap();
        assert_eq!(dict.try_remove(&2).unwrap().as_deref(), Some("O"));
        assert_eq!(dict.try_remove(&2).unwrap(), None);
        assert_eq!(dict.count().unwrap(), 1);
        runtime.shutdown();
    }

    #[test]
    fn test_missing_key() {
        let runtime = production_runtime();
        let dict: SharedDictionary<u32, String> = SharedDictionary::new(&runtime);

        let err = dict.get(&7).unwrap_err();
        assert!(matches!(err, SharedError::KeyNotFound { ref key } if key == "7"));
        assert_eq!(err.to_string(), "Key 7 was not found in the shared dictionary");
        runtime.shutdown();
    }

    #[test]
    fn test_access_after_shutdown_is_refused() {
        let runtime = production_runtime();
        let dict: SharedDictionary<u32, u32> = SharedDictionary::new(&runtime);
        runtime.shutdown();

        assert!(matches!(
            dict.try_add(1, 1),
            Err(SharedError::Runtime(actors::RuntimeError::ExecutionCanceled))
        ));
    }
}
