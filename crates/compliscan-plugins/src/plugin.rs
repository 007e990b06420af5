//! The plugin ABI: the four-operation contract every plugin implements.

use async_trait::async_trait;
use compliscan_core::{PluginContext, Result};
use compliscan_events::EventBus;

/// A loaded plugin's static description, built from its configuration
/// entry (§3: `{name, type, enabled, settings}`).
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    /// Resolved settings, always a JSON document (possibly `"{}"`).
    pub settings: String,
}

impl PluginDescriptor {
    pub fn parse_settings<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.settings)
            .map_err(|e| compliscan_core::Error::configuration(format!("invalid settings: {e}")))
    }
}

/// Every plugin in the pipeline satisfies this contract.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Must equal the factory key the plugin was registered under.
    fn name(&self) -> &str;
    fn kind(&self) -> &str;

    /// Validate settings, subscribe to input topics, and either run until
    /// `ctx` is cancelled or return promptly after spawning background
    /// work that itself observes `ctx`.
    async fn start(
        &self,
        ctx: PluginContext,
        descriptor: PluginDescriptor,
        bus: EventBus,
    ) -> Result<()>;

    /// Best-effort teardown with a bounded deadline.
    async fn stop(&self, ctx: PluginContext) -> Result<()>;
}
