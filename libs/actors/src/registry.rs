//! Descriptor Registry
//!
//! The static, read-only table of machine and monitor types a runtime can
//! instantiate. Built once and shared between runtimes, including every
//! iteration of a testing engine. The built-in timer machines are always
//! present.

use crate::descriptor::{ActorDescriptor, ActorKind};
use crate::errors::ConfigurationError;
use crate::timers;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Registry {
    machines: HashMap<String, Arc<ActorDescriptor>>,
    monitors: HashMap<String, Arc<ActorDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn machine(&self, type_tag: &str) -> Option<Arc<ActorDescriptor>> {
        self.machines.get(type_tag).cloned()
    }

    pub fn monitor(&self, type_tag: &str) -> Option<Arc<ActorDescriptor>> {
        self.monitors.get(type_tag).cloned()
    }

    /// Registered machine type tags, sorted
    pub fn machine_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.machines.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Registered monitor type tags, sorted
    pub fn monitor_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.monitors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ActorDescriptor>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: ActorDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let mut registry = Registry {
            machines: HashMap::new(),
            monitors: HashMap::new(),
        };

        for descriptor in timers::descriptors()?.into_iter().chain(self.descriptors) {
            let type_tag = descriptor.type_tag().to_string();
            if registry.machines.contains_key(&type_tag) || registry.monitors.contains_key(&type_tag) {
                return Err(ConfigurationError::DuplicateType { type_tag });
            }

            debug!(type_tag = %type_tag, kind = %descriptor.kind(), "Registered actor type");
            let table = match descriptor.kind() {
                ActorKind::Machine => &mut registry.machines,
                ActorKind::Monitor => &mut registry.monitors,
            };
            table.insert(type_tag, Arc::new(descriptor));
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, MonitorBuilder};

    #[derive(Default)]
    struct Data;

    fn machine(tag: &str) -> ActorDescriptor {
        MachineBuilder::<Data>::with_default(tag)
            .state("Init", |s| s.initial())
            .build()
            .unwrap()
    }

    #[test]
    fn test_machines_and_monitors_are_separated() {
        let monitor = MonitorBuilder::<Data>::with_default("Spec")
            .state("Init", |s| s.initial())
            .build()
            .unwrap();
        let registry = Registry::builder()
            .register(machine("Client"))
            .register(monitor)
            .build()
            .unwrap();

        assert!(registry.machine("Client").is_some());
        assert!(registry.machine("Spec").is_none());
        assert!(registry.monitor("Spec").is_some());
        assert!(registry.machine(timers::TIMER_TYPE).is_some());
        assert_eq!(registry.monitor_types(), vec!["Spec"]);
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let err = Registry::builder()
            .register(machine("Client"))
            .register(machine("Client"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateType {
                type_tag: "Client".into()
            }
        );

        let err = Registry::builder()
            .register(machine(timers::TIMER_TYPE))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateType { .. }));
    }
}
