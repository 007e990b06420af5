//! Configuration loading via `config`, layered YAML + environment overrides.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file shape (§3, §6 of the design doc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub plugins: Vec<PluginDescriptorConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub browser_pool: BrowserPoolConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            logging: LoggingConfig::default(),
            browser_pool: BrowserPoolConfig::default(),
            event_bus: EventBusConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    /// via the `COMPLISCAN_` prefix (e.g. `COMPLISCAN_LOGGING__LEVEL=debug`).
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("COMPLISCAN")
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg = builder
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| Error::configuration(e.to_string()))
    }
}

/// A single entry of the `plugins:` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptorConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: SettingsValue,
}

fn default_true() -> bool {
    true
}

/// Plugin settings accepted either as an inline JSON string or as a YAML
/// mapping (re-serialized to a JSON string internally, per §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum SettingsValue {
    #[default]
    Empty,
    Text(String),
    Mapping(serde_json::Value),
}

impl SettingsValue {
    /// Resolve to a JSON string, following `env:NAME` indirection (§6) when
    /// the raw form is a bare string with that prefix.
    pub fn resolve(&self) -> Result<String> {
        match self {
            SettingsValue::Empty => Ok("{}".to_string()),
            SettingsValue::Text(s) => {
                if let Some(var) = s.strip_prefix("env:") {
                    std::env::var(var).map_err(|_| {
                        Error::configuration(format!("environment variable {var} is not set"))
                    })
                } else {
                    Ok(s.clone())
                }
            }
            SettingsValue::Mapping(v) => serde_json::to_string(v)
                .map_err(|e| Error::configuration(format!("invalid settings: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            // tracing has no "fatal" level; errors of that severity are
            // logged at `error` and the process additionally exits.
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserPoolConfig {
    pub max_size: usize,
    pub max_age_secs: u64,
    pub wait_queue_cap: usize,
    pub close_grace_ms: u64,
    pub sigterm_grace_ms: u64,
    pub sigkill_grace_ms: u64,
    pub reap_interval_secs: u64,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_age_secs: 30 * 60,
            wait_queue_cap: 100,
            close_grace_ms: 5_000,
            sigterm_grace_ms: 500,
            sigkill_grace_ms: 300,
            reap_interval_secs: 60,
        }
    }
}

impl BrowserPoolConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
    pub fn sigterm_grace(&self) -> Duration {
        Duration::from_millis(self.sigterm_grace_ms)
    }
    pub fn sigkill_grace(&self) -> Duration {
        Duration::from_millis(self.sigkill_grace_ms)
    }
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    pub buffer_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { buffer_size: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub start_timeout_secs: u64,
    pub plugin_start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: 60,
            plugin_start_timeout_secs: 20,
            stop_timeout_secs: 20,
        }
    }
}

impl ManagerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
    pub fn plugin_start_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_start_timeout_secs)
    }
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert_eq!(config.browser_pool.max_size, 10);
        assert_eq!(config.event_bus.buffer_size, 10_000);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn settings_text_passthrough() {
        let v = SettingsValue::Text(r#"{"k":"v"}"#.to_string());
        assert_eq!(v.resolve().unwrap(), r#"{"k":"v"}"#);
    }

    #[test]
    fn settings_env_indirection() {
        std::env::set_var("COMPLISCAN_TEST_SETTING", "secret-value");
        let v = SettingsValue::Text("env:COMPLISCAN_TEST_SETTING".to_string());
        assert_eq!(v.resolve().unwrap(), "secret-value");
    }

    #[test]
    fn settings_mapping_reserializes_to_json() {
        let v = SettingsValue::Mapping(serde_json::json!({"interval_secs": 5}));
        let s = v.resolve().unwrap();
        assert!(s.contains("interval_secs"));
    }

    #[test]
    fn load_from_yaml_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("compliscan_test_config.yaml");
        std::fs::write(
            &path,
            r#"
plugins:
  - name: discovery.memory
    type: discovery
    enabled: true
    settings: "{}"
logging:
  level: debug
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.plugins[0].name, "discovery.memory");

        std::fs::remove_file(&path).ok();
    }
}
