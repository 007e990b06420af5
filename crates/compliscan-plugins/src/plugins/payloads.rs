//! Payload types shared by the bundled plugins. The bus itself never
//! inspects these; they exist purely for the producer/consumer edges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedPage {
    pub endpoint_id: String,
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warn,
    Violation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub endpoint_id: String,
    pub url: String,
    pub severity: Severity,
    pub reasons: Vec<String>,
}
