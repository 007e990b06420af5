//! Collector plugin: leases a browser from the pool, renders a discovered
//! endpoint, and publishes the captured page.

use crate::plugin::{Plugin, PluginDescriptor};
use crate::plugins::payloads::{CollectedPage, DiscoveredEndpoint};
use crate::plugins::topics;
use crate::worker::WorkerPool;
use async_trait::async_trait;
use compliscan_browser::BrowserPool;
use compliscan_core::{Error, PluginContext, Result};
use compliscan_events::{Event, EventBus};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_max_workers")]
    max_workers: usize,
    #[serde(default = "default_task_timeout_secs")]
    task_timeout_secs: u64,
}

fn default_max_workers() -> usize {
    20
}

fn default_task_timeout_secs() -> u64 {
    60
}

pub struct CollectorHttpPlugin {
    pool: BrowserPool,
}

impl CollectorHttpPlugin {
    pub fn new(pool: BrowserPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Plugin for CollectorHttpPlugin {
    fn name(&self) -> &str {
        "collector.http"
    }

    fn kind(&self) -> &str {
        "collector"
    }

    async fn start(
        &self,
        ctx: PluginContext,
        descriptor: PluginDescriptor,
        bus: EventBus,
    ) -> Result<()> {
        let settings: Settings = descriptor.parse_settings()?;
        let mut subscription = bus.subscribe(topics::DISCOVERY);
        let token = ctx.child_token();
        let pool = self.pool.clone();
        let workers = Arc::new(WorkerPool::new(settings.max_workers));
        let task_timeout = Duration::from_secs(settings.task_timeout_secs);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        workers.drain().await;
                        return;
                    }
                    received = subscription.recv() => {
                        let Some(event) = received else { return };
                        let Some(endpoint) = event.downcast::<DiscoveredEndpoint>() else {
                            error!("collector.http received a payload of an unexpected type");
                            continue;
                        };
                        let pool = pool.clone();
                        let bus = bus.clone();
                        let task_token = token.child_token();
                        workers
                            .spawn(async move {
                                dispatch_one(&pool, &endpoint, task_timeout, &bus, &task_token).await;
                            })
                            .await;
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

async fn dispatch_one(
    pool: &BrowserPool,
    endpoint: &DiscoveredEndpoint,
    task_timeout: Duration,
    bus: &EventBus,
    token: &CancellationToken,
) {
    match tokio::time::timeout(task_timeout, collect_one(pool, endpoint, token)).await {
        Ok(Ok(page)) => bus.publish(Event::new(topics::COLLECTOR, page)),
        Ok(Err(e)) => error!(url = %endpoint.url, error = %e, "collector.http: fetch failed"),
        Err(_) => error!(url = %endpoint.url, "collector.http: fetch timed out"),
    }
}

async fn collect_one(
    pool: &BrowserPool,
    endpoint: &DiscoveredEndpoint,
    token: &CancellationToken,
) -> Result<CollectedPage> {
    let lease = pool.get(token).await?;

    let page = lease
        .new_page(endpoint.url.as_str())
        .await
        .map_err(|e| Error::Network {
            message: format!("navigating to {}: {e}", endpoint.url),
        })?;

    page.wait_for_navigation().await.ok();

    let html = page.content().await.map_err(|e| Error::Network {
        message: format!("reading content of {}: {e}", endpoint.url),
    })?;

    Ok(CollectedPage {
        endpoint_id: endpoint.id.clone(),
        url: endpoint.url.clone(),
        html,
    })
}
