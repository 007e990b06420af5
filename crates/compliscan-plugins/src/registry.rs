//! Factory registry mapping a plugin's configured `name` to a constructor.
//!
//! Built once at program entry and handed to the manager by value, there
//! is no hidden global/static registry, so tests can construct independent
//! registries.

use crate::plugin::Plugin;
use std::collections::HashMap;
use std::sync::Arc;

type Factory = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, Factory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. A later registration for the same
    /// name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginDescriptor;
    use async_trait::async_trait;
    use compliscan_core::{PluginContext, Result};
    use compliscan_events::EventBus;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn kind(&self) -> &str {
            "noop"
        }
        async fn start(
            &self,
            _ctx: PluginContext,
            _descriptor: PluginDescriptor,
            _bus: EventBus,
        ) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _ctx: PluginContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_create() {
        let mut registry = PluginRegistry::new();
        registry.register("noop", || Arc::new(Noop));
        assert!(registry.contains("noop"));
        let plugin = registry.create("noop").unwrap();
        assert_eq!(plugin.name(), "noop");
    }

    #[test]
    fn unknown_name_returns_none() {
        let registry = PluginRegistry::new();
        assert!(registry.create("missing").is_none());
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = PluginRegistry::new();
        registry.register("dup", || Arc::new(Noop));
        registry.register("dup", || Arc::new(Noop));
        assert!(registry.create("dup").is_some());
    }
}
