//! Application configuration.
//!
//! A single JSON file in the data directory, loaded once at startup.
//! Every field has a serde default so a missing or partial file is fine.
//! The terminal status/fail-code tables live here so they can be updated
//! without a code change when the upstream shifts behavior.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_FILE: &str = "gateway_config.json";

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Smart poller tuning
    #[serde(default)]
    pub poller: PollerSettings,
    /// Terminal status / fail-code classification tables
    #[serde(default)]
    pub terminal: TerminalCodes,
    /// Reject unknown models on international tokens (domestic always falls
    /// back to the default model). Observed upstream behavior is asymmetric;
    /// the switch keeps that explicit.
    #[serde(default = "default_true")]
    pub strict_international_models: bool,
    /// Optional session provisioner endpoint; when unset,
    /// `/v1/session/generate` reports a provisioning error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_provisioner_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            poller: PollerSettings::default(),
            terminal: TerminalCodes::default(),
            strict_international_models: true,
            session_provisioner_url: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Smart poller tuning knobs. Intervals are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Hard cap on poll ticks per generation.
    #[serde(default = "default_max_poll_count")]
    pub max_poll_count: u32,
    /// Interval used for the first tick.
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Ceiling the interval widens toward.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Additive step applied when widening.
    #[serde(default = "default_widen_step_ms")]
    pub widen_step_ms: u64,
    /// Consecutive no-progress ticks before the interval widens.
    #[serde(default = "default_widen_after_ticks")]
    pub widen_after_ticks: u32,
    /// Consecutive no-progress ticks before the poll is declared stalled.
    #[serde(default = "default_stall_after_ticks")]
    pub stall_after_ticks: u32,
    /// Consecutive transport errors tolerated before giving up.
    #[serde(default = "default_max_transport_errors")]
    pub max_transport_errors: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            max_poll_count: default_max_poll_count(),
            base_interval_ms: default_base_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            widen_step_ms: default_widen_step_ms(),
            widen_after_ticks: default_widen_after_ticks(),
            stall_after_ticks: default_stall_after_ticks(),
            max_transport_errors: default_max_transport_errors(),
        }
    }
}

/// Terminal status and fail-code classification.
///
/// The exact sets are inferred from observation of the upstream, not from
/// documentation, so they are data rather than code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalCodes {
    /// History `status` values meaning the job finished successfully.
    #[serde(default = "default_success_statuses")]
    pub success_statuses: Vec<i64>,
    /// History `status` values meaning the job failed for good.
    #[serde(default = "default_failure_statuses")]
    pub failure_statuses: Vec<i64>,
    /// `fail_code` values that do NOT terminate the poll.
    #[serde(default)]
    pub transient_fail_codes: Vec<String>,
}

impl Default for TerminalCodes {
    fn default() -> Self {
        Self {
            success_statuses: default_success_statuses(),
            failure_statuses: default_failure_statuses(),
            transient_fail_codes: Vec::new(),
        }
    }
}

impl TerminalCodes {
    pub fn is_success(&self, status: i64) -> bool {
        self.success_statuses.contains(&status)
    }

    pub fn is_failure(&self, status: i64) -> bool {
        self.failure_statuses.contains(&status)
    }

    pub fn is_transient_fail_code(&self, code: &str) -> bool {
        self.transient_fail_codes.iter().any(|c| c == code)
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5100
}

fn default_max_poll_count() -> u32 {
    60
}

fn default_base_interval_ms() -> u64 {
    2000
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_widen_step_ms() -> u64 {
    1000
}

fn default_widen_after_ticks() -> u32 {
    3
}

fn default_stall_after_ticks() -> u32 {
    12
}

fn default_max_transport_errors() -> u32 {
    3
}

fn default_success_statuses() -> Vec<i64> {
    vec![50]
}

fn default_failure_statuses() -> Vec<i64> {
    vec![30, 60]
}

/// Resolve the data directory, honoring `DREAMINA_DATA_DIR`.
pub fn get_data_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("DREAMINA_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join("dreamina-gateway"))
        .ok_or_else(|| "Could not determine config directory".to_string())
}

/// Load the application config, falling back to defaults when absent.
pub fn load_config() -> Result<AppConfig, String> {
    let data_dir = get_data_dir()?;
    let config_path = data_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(AppConfig::default());
    }

    let content =
        fs::read_to_string(&config_path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Save the application config (atomic write).
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    let data_dir = get_data_dir()?;
    fs::create_dir_all(&data_dir).map_err(|e| format!("Failed to create data dir: {}", e))?;
    let config_path = data_dir.join(CONFIG_FILE);
    let temp_path = data_dir.join(format!("{}.tmp", CONFIG_FILE));

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(&temp_path, content).map_err(|e| format!("Failed to write temp config: {}", e))?;
    fs::rename(&temp_path, &config_path).map_err(|e| format!("Failed to save config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_missing_fields() {
        let config: AppConfig = serde_json::from_str("{}").expect("empty object parses");
        assert_eq!(config.server.port, 5100);
        assert_eq!(config.poller.max_poll_count, 60);
        assert!(config.strict_international_models);
        assert!(config.terminal.is_success(50));
        assert!(config.terminal.is_failure(30));
    }

    #[test]
    fn terminal_tables_are_data_driven() {
        let raw = r#"{"terminal":{"success_statuses":[50,55],"failure_statuses":[30],"transient_fail_codes":["1180"]}}"#;
        let config: AppConfig = serde_json::from_str(raw).expect("parses");
        assert!(config.terminal.is_success(55));
        assert!(config.terminal.is_transient_fail_code("1180"));
        assert!(!config.terminal.is_transient_fail_code("2038"));
    }
}
