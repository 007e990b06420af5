//! Plugin ABI, factory registry, supervised manager, bounded worker pool,
//! and the bundled illustrative plugins.

pub mod manager;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod worker;

pub use manager::{PluginManager, StartReport, StopReport};
pub use plugin::{Plugin, PluginDescriptor};
pub use registry::PluginRegistry;
pub use worker::WorkerPool;
