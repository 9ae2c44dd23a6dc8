use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Daily rolling log files go here when set, in addition to stderr.
    #[serde(default)]
    pub log_directory: Option<String>,
    /// Overrides `<home>/of-controller-db/floodlight`.
    #[serde(default)]
    pub record_directory: Option<String>,
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    #[serde(default = "default_stats_timeout_secs")]
    pub stats_timeout_secs: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_seconds: u64,
    #[serde(default)]
    pub alert_webhook: Option<String>,
    #[serde(default = "default_bus_address")]
    pub bus_address: String,
    #[serde(default = "default_bus_client_name")]
    pub bus_client_name: String,
    #[serde(default = "default_controller_target")]
    pub controller_target: String,
}

fn default_service_name() -> String {
    "switch-recorder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sampling_interval_ms() -> u64 {
    10_000
}

fn default_stats_timeout_secs() -> u64 {
    10
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_idle_threshold_secs() -> u64 {
    120
}

fn default_bus_address() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_bus_client_name() -> String {
    "switch.recorder".to_string()
}

fn default_controller_target() -> String {
    "floodlight.controller".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            log_directory: None,
            record_directory: None,
            sampling_interval_ms: default_sampling_interval_ms(),
            stats_timeout_secs: default_stats_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            idle_threshold_seconds: default_idle_threshold_secs(),
            alert_webhook: None,
            bus_address: default_bus_address(),
            bus_client_name: default_bus_client_name(),
            controller_target: default_controller_target(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> &'static str {
        "config/switch-recorder.toml"
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("failed to read configuration from {}", path_ref.display()))?;
        let mut config: Self = toml::from_str(&raw).with_context(|| {
            format!("failed to parse configuration from {}", path_ref.display())
        })?;
        if config.service_name.trim().is_empty() {
            config.service_name = default_service_name();
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sampling_interval_ms == 0 {
            bail!("sampling_interval_ms must be greater than zero");
        }
        if self.stats_timeout_secs == 0 {
            bail!("stats_timeout_secs must be greater than zero");
        }
        if self.health_interval_secs == 0 {
            bail!("health_interval_secs must be greater than zero");
        }
        Ok(())
    }
}
