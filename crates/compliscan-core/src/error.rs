//! Unified error type, shared across the scanning pipeline's crates.

use thiserror::Error;

/// The unified error type for compliscan operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("plugin error: {plugin}: {message}")]
    Plugin { plugin: String, message: String },

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("pool exhausted")]
    PoolFull,

    #[error("timed out waiting for a pooled instance")]
    PoolTimeout,

    #[error("browser launch failed: {message}")]
    BrowserLaunch { message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::PoolFull | Error::PoolTimeout
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(Error::PoolFull.is_retryable());
        assert!(!Error::ShutdownInProgress.is_retryable());
    }

    #[test]
    fn constructors() {
        let e = Error::plugin("detector.rules", "bad settings");
        assert_eq!(e.to_string(), "plugin error: detector.rules: bad settings");
    }
}
