//! A discovery plugin that periodically emits a fixed, configured list of
//! endpoints. Stands in for the Kubernetes discovery adapter.

use crate::plugin::{Plugin, PluginDescriptor};
use crate::plugins::payloads::DiscoveredEndpoint;
use crate::plugins::topics;
use async_trait::async_trait;
use compliscan_core::{PluginContext, Result};
use compliscan_events::{Event, EventBus};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default)]
    endpoints: Vec<DiscoveredEndpoint>,
}

fn default_interval_secs() -> u64 {
    60
}

pub struct DiscoveryMemoryPlugin;

#[async_trait]
impl Plugin for DiscoveryMemoryPlugin {
    fn name(&self) -> &str {
        "discovery.memory"
    }

    fn kind(&self) -> &str {
        "discovery"
    }

    async fn start(
        &self,
        ctx: PluginContext,
        descriptor: PluginDescriptor,
        bus: EventBus,
    ) -> Result<()> {
        let settings: Settings = descriptor.parse_settings()?;
        let token = ctx.child_token();

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(settings.interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("discovery.memory stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        for endpoint in &settings.endpoints {
                            bus.publish(Event::new(topics::DISCOVERY, endpoint.clone()));
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self, _ctx: PluginContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn emits_configured_endpoints() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe(topics::DISCOVERY);

        let descriptor = PluginDescriptor {
            name: "discovery.memory".into(),
            kind: "discovery".into(),
            enabled: true,
            settings: r#"{"interval_secs":1,"endpoints":[{"id":"a","url":"http://a"}]}"#.into(),
        };

        let token = CancellationToken::new();
        let ctx = PluginContext::new(token.clone(), Duration::from_secs(5));
        DiscoveryMemoryPlugin.start(ctx, descriptor, bus).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), sub.recv())
            .await
            .unwrap()
            .unwrap();
        let endpoint = event.downcast::<DiscoveredEndpoint>().unwrap();
        assert_eq!(endpoint.id, "a");

        token.cancel();
    }
}
