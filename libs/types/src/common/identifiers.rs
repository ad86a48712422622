//! # Actor Identities
//!
//! An [`ActorId`] is a handle that senders hold to address an actor. It is
//! never mutated after allocation and is cheap to clone.
//!
//! ## Identification Modes
//!
//! - **Numeric**: the default. The value comes from the owning runtime's
//!   [`IdAllocator`] counter and the display name is `Type(value)` (or
//!   `friendly(value)` when a friendly name was given).
//! - **Named**: the friendly name *is* the key. The numeric value is zero and
//!   the display name is the name verbatim.
//!
//! Two ids are equal iff they use the same mode, their key matches and they
//! were allocated in the same generation. The display name and type tag do
//! not take part in equality.
//!
//! ## Generations
//!
//! Exploration runs the same program hundreds of times inside one process.
//! Instead of restarting the process, the allocator bumps its generation and
//! resets the counter, so `Client(0)` of iteration 3 is a different actor from
//! `Client(0)` of iteration 2.

use crate::common::errors::IdentityError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Unique, generation-scoped actor identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorId {
    value: u64,
    name_value: String,
    type_tag: String,
    name: String,
    generation: u64,
}

impl ActorId {
    /// Numeric value, zero for named identities
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The custom name used as key, empty for numeric identities
    pub fn name_value(&self) -> &str {
        &self.name_value
    }

    /// Type tag of the actor this id was allocated for
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Display name used in logs and bug reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generation of the runtime that allocated this id
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if the custom name is the identity key
    pub fn is_name_used_for_hashing(&self) -> bool {
        !self.name_value.is_empty()
    }
}

impl PartialEq for ActorId {
    fn eq(&self, other: &Self) -> bool {
        if self.is_name_used_for_hashing() != other.is_name_used_for_hashing() {
            return false;
        }

        let same_key = if self.is_name_used_for_hashing() {
            self.name_value == other.name_value
        } else {
            self.value == other.value
        };

        same_key && self.generation == other.generation
    }
}

impl Eq for ActorId {}

impl Hash for ActorId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_name_used_for_hashing().hash(state);
        if self.is_name_used_for_hashing() {
            self.name_value.hash(state);
        } else {
            self.value.hash(state);
        }
        self.generation.hash(state);
    }
}

impl Ord for ActorId {
    /// Orders by display name for deterministic reports. Equal ids always
    /// compare `Equal`; remaining ties fall back to generation, then key.
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }

        self.name
            .cmp(&other.name)
            .then(self.generation.cmp(&other.generation))
            .then(
                self.is_name_used_for_hashing()
                    .cmp(&other.is_name_used_for_hashing()),
            )
            .then(self.value.cmp(&other.value))
            .then(self.name_value.cmp(&other.name_value))
    }
}

impl PartialOrd for ActorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-runtime identity allocator
///
/// Owns the numeric counter and the current generation. Shared by reference
/// between every component that creates actors inside one runtime.
#[derive(Debug)]
pub struct IdAllocator {
    counter: AtomicU64,
    generation: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator starting at `generation`
    pub fn new(generation: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            generation: AtomicU64::new(generation),
        }
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::SeqCst)
    }

    /// Start a new generation and reset the counter. Returns the new generation.
    pub fn next_generation(&self) -> u64 {
        self.counter.store(0, AtomicOrdering::SeqCst);
        self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    /// Allocate an identity for an actor of `type_tag`
    ///
    /// With `use_name_for_hashing` the friendly name becomes the key and must
    /// not be empty. Otherwise the next counter value is taken; the counter
    /// refuses to hand out `u64::MAX` instead of wrapping.
    pub fn create(
        &self,
        type_tag: &str,
        friendly_name: &str,
        use_name_for_hashing: bool,
    ) -> Result<ActorId, IdentityError> {
        let generation = self.generation();

        if use_name_for_hashing {
            if friendly_name.is_empty() {
                return Err(IdentityError::invalid(type_tag));
            }

            return Ok(ActorId {
                value: 0,
                name_value: friendly_name.to_string(),
                type_tag: type_tag.to_string(),
                name: friendly_name.to_string(),
                generation,
            });
        }

        let value = self
            .counter
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |current| {
                if current == u64::MAX {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .map_err(|_| IdentityError::overflow(generation))?;

        let label = if friendly_name.is_empty() {
            type_tag
        } else {
            friendly_name
        };

        Ok(ActorId {
            value,
            name_value: String::new(),
            type_tag: type_tag.to_string(),
            name: format!("{}({})", label, value),
            generation,
        })
    }

    #[cfg(test)]
    fn with_counter(generation: u64, counter: u64) -> Self {
        Self {
            counter: AtomicU64::new(counter),
            generation: AtomicU64::new(generation),
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_numeric_display_name() {
        let ids = IdAllocator::new(0);
        let a = ids.create("Server", "", false).unwrap();
        let b = ids.create("Server", "primary", false).unwrap();

        assert_eq!(a.to_string(), "Server(0)");
        assert_eq!(b.to_string(), "primary(1)");
        assert_eq!(b.type_tag(), "Server");
        assert!(!a.is_name_used_for_hashing());
    }

    #[test]
    fn test_named_identity() {
        let ids = IdAllocator::new(4);
        let id = ids.create("Server", "leader", true).unwrap();

        assert_eq!(id.to_string(), "leader");
        assert_eq!(id.value(), 0);
        assert_eq!(id.generation(), 4);
        assert!(id.is_name_used_for_hashing());

        // Named ids do not consume counter values
        let numeric = ids.create("Server", "", false).unwrap();
        assert_eq!(numeric.value(), 0);
        assert_ne!(id, numeric);
    }

    #[test]
    fn test_named_identity_requires_name() {
        let ids = IdAllocator::new(0);
        let err = ids.create("Server", "", true).unwrap_err();
        assert_eq!(err, IdentityError::invalid("Server"));
    }

    #[test]
    fn test_overflow_is_reported() {
        let ids = IdAllocator::with_counter(2, u64::MAX - 1);
        let last = ids.create("Client", "", false).unwrap();
        assert_eq!(last.value(), u64::MAX - 1);

        let err = ids.create("Client", "", false).unwrap_err();
        assert_eq!(err, IdentityError::overflow(2));
    }

    #[test]
    fn test_generation_bump_resets_counter() {
        let ids = IdAllocator::new(0);
        let first = ids.create("Client", "", false).unwrap();
        ids.create("Client", "", false).unwrap();

        assert_eq!(ids.next_generation(), 1);
        let again = ids.create("Client", "", false).unwrap();

        assert_eq!(first.value(), again.value());
        assert_eq!(first.name(), again.name());
        assert_ne!(first, again);
        assert_ne!(first.cmp(&again), Ordering::Equal);
    }

    #[test]
    fn test_equality_ignores_display_name() {
        let ids = IdAllocator::new(0);
        let id = ids.create("Client", "", false).unwrap();
        let mut relabeled = id.clone();
        relabeled.name = "Other(0)".to_string();

        assert_eq!(id, relabeled);
        assert_eq!(id.cmp(&relabeled), Ordering::Equal);

        let mut set = HashSet::new();
        set.insert(id);
        assert!(set.contains(&relabeled));
    }

    #[test]
    fn test_ordering_by_display_name() {
        let ids = IdAllocator::new(0);
        let b = ids.create("Beta", "", false).unwrap();
        let a = ids.create("Alpha", "", false).unwrap();

        let mut sorted = vec![b.clone(), a.clone()];
        sorted.sort();
        assert_eq!(sorted, vec![a, b]);
    }

    #[test]
    fn test_serde_preserves_identity() {
        let ids = IdAllocator::new(7);
        let id = ids.create("Client", "", false).unwrap();

        let json = serde_json::to_string(&id).unwrap();
        let decoded: ActorId = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, id);
        assert_eq!(decoded.name(), id.name());
    }
}
