//! Shared types for the compliance-scanning pipeline: configuration, the
//! unified error type, and the cancellation context handed to plugins.

pub mod config;
pub mod context;
pub mod error;

pub use config::AppConfig;
pub use context::PluginContext;
pub use error::{Error, Result};
