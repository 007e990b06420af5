//! Loads plugins from configuration, supervises their startup, and stops
//! them on shutdown.

use crate::plugin::{Plugin, PluginDescriptor};
use crate::registry::PluginRegistry;
use compliscan_core::config::{ManagerConfig, PluginDescriptorConfig};
use compliscan_core::PluginContext;
use compliscan_events::EventBus;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

struct LoadedPlugin {
    descriptor: PluginDescriptor,
    plugin: Arc<dyn Plugin>,
    token: CancellationToken,
}

/// Outcome of `start_all`: which plugins are running, which failed.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Outcome of `stop_all`.
#[derive(Debug, Default)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct PluginManager {
    bus: EventBus,
    config: ManagerConfig,
    root_cancel: CancellationToken,
    loaded: RwLock<HashMap<String, Arc<LoadedPlugin>>>,
}

impl PluginManager {
    pub fn new(bus: EventBus, config: ManagerConfig) -> Self {
        Self {
            bus,
            config,
            root_cancel: CancellationToken::new(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Instantiate every descriptor whose factory is registered. A missing
    /// factory or an already-loaded name is a warning, never fatal. The
    /// rest of the batch still loads.
    pub fn load_plugins(&self, registry: &PluginRegistry, descriptors: Vec<PluginDescriptorConfig>) {
        let mut loaded = self.loaded.write();

        for descriptor in descriptors {
            if loaded.contains_key(&descriptor.name) {
                debug!(name = %descriptor.name, "plugin already loaded, skipping");
                continue;
            }

            let Some(plugin) = registry.create(&descriptor.name) else {
                warn!(name = %descriptor.name, "no factory registered for plugin, skipping");
                continue;
            };

            let settings = match descriptor.settings.resolve() {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(name = %descriptor.name, error = %e, "failed to resolve plugin settings, skipping");
                    continue;
                }
            };

            let entry = LoadedPlugin {
                descriptor: PluginDescriptor {
                    name: descriptor.name.clone(),
                    kind: descriptor.kind,
                    enabled: descriptor.enabled,
                    settings,
                },
                plugin,
                token: self.root_cancel.child_token(),
            };
            loaded.insert(descriptor.name, Arc::new(entry));
        }
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded.read().keys().cloned().collect()
    }

    /// Start every loaded, enabled plugin concurrently. Waits for all
    /// starts to return (or the overall `manager.start_timeout`), then
    /// reports the aggregate; a failed plugin does not prevent its
    /// siblings from running.
    pub async fn start_all(&self) -> StartReport {
        let snapshot: Vec<Arc<LoadedPlugin>> = self.loaded.read().values().cloned().collect();
        let plugin_deadline = self.config.plugin_start_timeout();
        let bus = self.bus.clone();

        let attempts = snapshot
            .into_iter()
            .filter(|entry| entry.descriptor.enabled)
            .map(|entry| {
                let bus = bus.clone();
                async move {
                    let name = entry.descriptor.name.clone();
                    let ctx = PluginContext::new(entry.token.clone(), plugin_deadline);
                    let outcome = tokio::time::timeout(
                        plugin_deadline,
                        entry.plugin.start(ctx, entry.descriptor.clone(), bus),
                    )
                    .await;

                    match outcome {
                        Ok(Ok(())) => (name, None),
                        Ok(Err(e)) => (name, Some(e.to_string())),
                        Err(_) => (name, Some("plugin start timed out".to_string())),
                    }
                }
            });

        let results = match tokio::time::timeout(
            self.config.start_timeout(),
            futures::future::join_all(attempts),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                warn!("start_all exceeded the overall start timeout");
                Vec::new()
            }
        };

        let mut report = StartReport::default();
        for (name, failure) in results {
            match failure {
                None => report.started.push(name),
                Some(message) => {
                    error!(name = %name, error = %message, "plugin failed to start");
                    report.failed.push((name, message));
                }
            }
        }
        report
    }

    /// Stop every loaded plugin, then cancel the shared root token so any
    /// plugin still inside `start` returns promptly.
    pub async fn stop_all(&self) -> StopReport {
        let snapshot: Vec<Arc<LoadedPlugin>> = self.loaded.read().values().cloned().collect();
        let deadline = self.config.stop_timeout();
        let mut report = StopReport::default();

        for entry in snapshot {
            let name = entry.descriptor.name.clone();
            let ctx = PluginContext::new(entry.token.clone(), deadline);
            match tokio::time::timeout(deadline, entry.plugin.stop(ctx)).await {
                Ok(Ok(())) => report.stopped.push(name),
                Ok(Err(e)) => {
                    error!(name = %name, error = %e, "plugin stop returned an error");
                    report.failed.push((name, e.to_string()));
                }
                Err(_) => {
                    error!(name = %name, "plugin stop timed out");
                    report.failed.push((name, "stop timed out".to_string()));
                }
            }
        }

        self.root_cancel.cancel();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginDescriptor as PD;
    use async_trait::async_trait;
    use compliscan_core::config::SettingsValue;
    use compliscan_core::Result;

    struct AlwaysOk;

    #[async_trait]
    impl Plugin for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        fn kind(&self) -> &str {
            "test"
        }
        async fn start(&self, _ctx: PluginContext, _d: PD, _bus: EventBus) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _ctx: PluginContext) -> Result<()> {
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Plugin for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        fn kind(&self) -> &str {
            "test"
        }
        async fn start(&self, _ctx: PluginContext, _d: PD, _bus: EventBus) -> Result<()> {
            Err(compliscan_core::Error::plugin("always-fails", "boom"))
        }
        async fn stop(&self, _ctx: PluginContext) -> Result<()> {
            Ok(())
        }
    }

    fn descriptor(name: &str) -> PluginDescriptorConfig {
        PluginDescriptorConfig {
            name: name.to_string(),
            kind: "test".to_string(),
            enabled: true,
            settings: SettingsValue::Empty,
        }
    }

    #[tokio::test]
    async fn missing_factory_is_skipped_not_fatal() {
        let manager = PluginManager::new(EventBus::new(10), ManagerConfig::default());
        let mut registry = PluginRegistry::new();
        registry.register("always-ok", || Arc::new(AlwaysOk));

        manager.load_plugins(
            &registry,
            vec![descriptor("missing"), descriptor("always-ok")],
        );

        assert_eq!(manager.loaded_names(), vec!["always-ok".to_string()]);
    }

    #[tokio::test]
    async fn start_all_reports_mixed_outcomes() {
        let manager = PluginManager::new(EventBus::new(10), ManagerConfig::default());
        let mut registry = PluginRegistry::new();
        registry.register("always-ok", || Arc::new(AlwaysOk));
        registry.register("always-fails", || Arc::new(AlwaysFails));

        manager.load_plugins(
            &registry,
            vec![descriptor("always-ok"), descriptor("always-fails")],
        );

        let report = manager.start_all().await;
        assert_eq!(report.started, vec!["always-ok".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "always-fails");
    }

    #[tokio::test]
    async fn stop_all_cancels_root_token() {
        let manager = PluginManager::new(EventBus::new(10), ManagerConfig::default());
        let mut registry = PluginRegistry::new();
        registry.register("always-ok", || Arc::new(AlwaysOk));
        manager.load_plugins(&registry, vec![descriptor("always-ok")]);

        let report = manager.stop_all().await;
        assert_eq!(report.stopped, vec!["always-ok".to_string()]);
    }
}
