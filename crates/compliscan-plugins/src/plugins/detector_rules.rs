//! A rule-based detector: applies configured substring/regex rules against
//! collected page content. Stands in for the LLM content-review adapter.

use crate::plugin::{Plugin, PluginDescriptor};
use crate::plugins::payloads::{CollectedPage, Severity, Verdict};
use crate::plugins::topics;
use crate::worker::WorkerPool;
use async_trait::async_trait;
use compliscan_core::{Error, PluginContext, Result};
use compliscan_events::{Event, EventBus};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
struct RuleSetting {
    pattern: String,
    reason: String,
    #[serde(default = "default_severity")]
    severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Violation
}

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default)]
    rules: Vec<RuleSetting>,
    #[serde(default = "default_max_workers")]
    max_workers: usize,
}

fn default_max_workers() -> usize {
    20
}

struct CompiledRule {
    pattern: Regex,
    reason: String,
    severity: Severity,
}

pub struct DetectorRulesPlugin;

#[async_trait]
impl Plugin for DetectorRulesPlugin {
    fn name(&self) -> &str {
        "detector.rules"
    }

    fn kind(&self) -> &str {
        "detector"
    }

    async fn start(
        &self,
        ctx: PluginContext,
        descriptor: PluginDescriptor,
        bus: EventBus,
    ) -> Result<()> {
        let settings: Settings = descriptor.parse_settings()?;
        let rules = settings
            .rules
            .into_iter()
            .map(|r| {
                Regex::new(&r.pattern)
                    .map(|pattern| CompiledRule {
                        pattern,
                        reason: r.reason,
                        severity: r.severity,
                    })
                    .map_err(|e| {
                        Error::configuration(format!("invalid rule pattern {:?}: {e}", r.pattern))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let rules = Arc::new(rules);

        let mut subscription = bus.subscribe(topics::COLLECTOR);
        let token = ctx.child_token();
        let workers = Arc::new(WorkerPool::new(settings.max_workers));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        workers.drain().await;
                        return;
                    }
                    received = subscription.recv() => {
                        let Some(event) = received else { return };
                        let Some(page) = event.downcast::<CollectedPage>() else {
                            error!("detector.rules received a payload of an unexpected type");
                            continue;
                        };
                        let rules = rules.clone();
                        let bus = bus.clone();
                        workers
                            .spawn(async move {
                                let verdict = evaluate(&page, &rules);
                                bus.publish(Event::new(topics::DETECTOR, verdict));
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

fn evaluate(page: &CollectedPage, rules: &[CompiledRule]) -> Verdict {
    let mut reasons = Vec::new();
    let mut severity = Severity::Ok;

    for rule in rules {
        if rule.pattern.is_match(&page.html) {
            reasons.push(rule.reason.clone());
            if rank(rule.severity) > rank(severity) {
                severity = rule.severity;
            }
        }
    }

    Verdict {
        endpoint_id: page.endpoint_id.clone(),
        url: page.url.clone(),
        severity,
        reasons,
    }
}

fn rank(severity: Severity) -> u8 {
    match severity {
        Severity::Ok => 0,
        Severity::Warn => 1,
        Severity::Violation => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rule_raises_severity() {
        let rules = vec![CompiledRule {
            pattern: Regex::new("secret-key").unwrap(),
            reason: "leaked credential".to_string(),
            severity: Severity::Violation,
        }];
        let page = CollectedPage {
            endpoint_id: "a".into(),
            url: "http://a".into(),
            html: "<html>secret-key=abc</html>".into(),
        };

        let verdict = evaluate(&page, &rules);
        assert_eq!(verdict.severity, Severity::Violation);
        assert_eq!(verdict.reasons, vec!["leaked credential".to_string()]);
    }

    #[test]
    fn no_match_is_ok() {
        let rules = vec![CompiledRule {
            pattern: Regex::new("secret-key").unwrap(),
            reason: "leaked credential".to_string(),
            severity: Severity::Violation,
        }];
        let page = CollectedPage {
            endpoint_id: "a".into(),
            url: "http://a".into(),
            html: "<html>hello</html>".into(),
        };

        let verdict = evaluate(&page, &rules);
        assert_eq!(verdict.severity, Severity::Ok);
        assert!(verdict.reasons.is_empty());
    }
}
