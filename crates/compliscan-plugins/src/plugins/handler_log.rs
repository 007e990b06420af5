//! Logs verdicts at a severity-appropriate level. Stands in for the
//! persistence and notification adapters.

use crate::plugin::{Plugin, PluginDescriptor};
use crate::plugins::payloads::{Severity, Verdict};
use crate::plugins::topics;
use async_trait::async_trait;
use compliscan_core::{PluginContext, Result};
use compliscan_events::EventBus;
use tracing::{info, warn};

pub struct HandlerLogPlugin;

#[async_trait]
impl Plugin for HandlerLogPlugin {
    fn name(&self) -> &str {
        "handler.log"
    }

    fn kind(&self) -> &str {
        "handler"
    }

    async fn start(
        &self,
        ctx: PluginContext,
        _descriptor: PluginDescriptor,
        bus: EventBus,
    ) -> Result<()> {
        let mut subscription = bus.subscribe(topics::DETECTOR);
        let token = ctx.child_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    received = subscription.recv() => {
                        let Some(event) = received else { return };
                        let Some(verdict) = event.downcast::<Verdict>() else {
                            tracing::error!("handler.log received a payload of an unexpected type");
                            continue;
                        };
                        log_verdict(&verdict);
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

fn log_verdict(verdict: &Verdict) {
    match verdict.severity {
        Severity::Violation => warn!(
            endpoint = %verdict.endpoint_id,
            url = %verdict.url,
            reasons = ?verdict.reasons,
            "compliance violation detected"
        ),
        Severity::Warn => warn!(
            endpoint = %verdict.endpoint_id,
            url = %verdict.url,
            reasons = ?verdict.reasons,
            "compliance warning"
        ),
        Severity::Ok => info!(
            endpoint = %verdict.endpoint_id,
            url = %verdict.url,
            "endpoint passed compliance checks"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliscan_events::Event;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn consumes_published_verdicts() {
        let bus = EventBus::new(10);
        let token = CancellationToken::new();
        let ctx = PluginContext::new(token.clone(), Duration::from_secs(5));
        let descriptor = PluginDescriptor {
            name: "handler.log".into(),
            kind: "handler".into(),
            enabled: true,
            settings: "{}".into(),
        };

        HandlerLogPlugin
            .start(ctx, descriptor, bus.clone())
            .await
            .unwrap();

        // give the subscribe-then-loop task a chance to register before publishing
        tokio::task::yield_now().await;

        bus.publish(Event::new(
            topics::DETECTOR,
            Verdict {
                endpoint_id: "a".into(),
                url: "http://a".into(),
                severity: Severity::Ok,
                reasons: vec![],
            },
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    }
}
