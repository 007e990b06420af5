//! Illustrative, fully-working plugins standing in for the out-of-scope
//! production adapters (Kubernetes discovery, LLM review, persistence,
//! notifications) so the pipeline can be exercised end-to-end.

pub mod collector_http;
pub mod detector_rules;
pub mod discovery_memory;
pub mod handler_log;
pub mod payloads;
pub mod topics;

pub use collector_http::CollectorHttpPlugin;
pub use detector_rules::DetectorRulesPlugin;
pub use discovery_memory::DiscoveryMemoryPlugin;
pub use handler_log::HandlerLogPlugin;
