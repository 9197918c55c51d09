//! Layered configuration for issuedesk.
//!
//! Settings come from `issuedesk.toml` (user config dir, or `--config`),
//! then environment variables, then CLI flags. Every field has a default,
//! so an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! api_url = "https://issues.example.com/api"
//! ws_url = "wss://issues.example.com/api"   # derived from api_url when omitted
//! request_timeout_secs = 30
//!
//! [realtime]
//! heartbeat_secs = 30
//! max_reconnect_attempts = 5
//! reconnect_base_ms = 1000
//! reconnect_max_ms = 30000
//! dedup_window_ms = 1000
//! debounce_ms = 50
//!
//! [trajectory]
//! poll_interval_ms = 2000
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "issuedesk.toml";

/// Backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// WebSocket base; `http(s)` in `api_url` becomes `ws(s)` when unset
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn ws_base(&self) -> String {
        if let Some(ws) = &self.ws_url {
            return ws.trim_end_matches('/').to_string();
        }
        let api = self.api_url.trim_end_matches('/');
        if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            api.to_string()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Session WebSocket tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Capacity of the event channel handed to consumers
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_dedup_window_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_event_buffer() -> usize {
    256
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            debounce_ms: default_debounce_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TrajectoryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive applied to the issuedesk crates
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Root of `issuedesk.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuedeskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl IssuedeskConfig {
    /// Default location: `<config dir>/issuedesk/issuedesk.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("issuedesk").join(CONFIG_FILE_NAME))
    }

    /// Load file then environment. An explicit `path` must exist; the
    /// default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Apply `ISSUEDESK_*` overrides. The lookup is injected for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ISSUEDESK_API_URL") {
            self.server.api_url = url;
        }
        if let Some(url) = lookup("ISSUEDESK_WS_URL") {
            self.server.ws_url = Some(url);
        }
        if let Some(level) = lookup("ISSUEDESK_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("ISSUEDESK_LOG_JSON") {
            self.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
    }

    /// Apply CLI flags, which win over file and environment.
    pub fn apply_cli(&mut self, api_url: Option<&str>, verbose: bool) {
        if let Some(url) = api_url {
            self.server.api_url = url.to_string();
        }
        if verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Non-fatal problems worth showing to the user.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let api = &self.server.api_url;
        if !api.starts_with("http://") && !api.starts_with("https://") {
            warnings.push(format!("server.api_url '{}' is not an http(s) URL", api));
        }
        if let Some(ws) = &self.server.ws_url {
            if !ws.starts_with("ws://") && !ws.starts_with("wss://") {
                warnings.push(format!("server.ws_url '{}' is not a ws(s) URL", ws));
            }
        }
        let rt = &self.realtime;
        if rt.max_reconnect_attempts == 0 {
            warnings.push("realtime.max_reconnect_attempts is 0; a dropped socket is never retried".into());
        }
        if rt.reconnect_base_ms > rt.reconnect_max_ms {
            warnings.push(format!(
                "realtime.reconnect_base_ms ({}) exceeds reconnect_max_ms ({})",
                rt.reconnect_base_ms, rt.reconnect_max_ms
            ));
        }
        if rt.heartbeat_secs == 0 {
            warnings.push("realtime.heartbeat_secs is 0; heartbeats are disabled".into());
        }
        if rt.debounce_ms > 1000 {
            warnings.push(format!(
                "realtime.debounce_ms ({}) delays every update by up to a second or more",
                rt.debounce_ms
            ));
        }
        if self.trajectory.poll_interval_ms < 250 {
            warnings.push(format!(
                "trajectory.poll_interval_ms ({}) is aggressive; the backend may rate-limit",
                self.trajectory.poll_interval_ms
            ));
        }
        warnings
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = IssuedeskConfig::default();
        assert_eq!(config.realtime.heartbeat(), Duration::from_secs(30));
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.realtime.reconnect_base_ms, 1000);
        assert_eq!(config.realtime.reconnect_max_ms, 30_000);
        assert_eq!(config.realtime.dedup_window(), Duration::from_secs(1));
        assert_eq!(config.realtime.debounce(), Duration::from_millis(50));
        assert_eq!(config.trajectory.poll_interval(), Duration::from_millis(2000));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = IssuedeskConfig::parse(
            r#"
[server]
api_url = "https://issues.example.com/api/"

[realtime]
debounce_ms = 20
"#,
        )
        .unwrap();
        assert_eq!(config.server.api_url, "https://issues.example.com/api/");
        assert_eq!(config.realtime.debounce_ms, 20);
        assert_eq!(config.realtime.heartbeat_secs, 30);
        assert_eq!(config.server.ws_base(), "wss://issues.example.com/api");
    }

    #[test]
    fn test_ws_base_prefers_explicit_url() {
        let mut server = ServerConfig::default();
        assert_eq!(server.ws_base(), "ws://localhost:8000/api");
        server.ws_url = Some("wss://rt.example.com/".to_string());
        assert_eq!(server.ws_base(), "wss://rt.example.com");
    }

    #[test]
    fn test_env_then_cli_precedence() {
        let env: HashMap<&str, &str> = [
            ("ISSUEDESK_API_URL", "http://env:1/api"),
            ("ISSUEDESK_LOG", "warn"),
            ("ISSUEDESK_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = IssuedeskConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.api_url, "http://env:1/api");
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json);

        config.apply_cli(Some("http://cli:2/api"), true);
        assert_eq!(config.server.api_url, "http://cli:2/api");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_flags_suspicious_values() {
        let mut config = IssuedeskConfig::default();
        config.server.api_url = "localhost:8000".to_string();
        config.realtime.reconnect_base_ms = 60_000;
        config.realtime.max_reconnect_attempts = 0;
        config.trajectory.poll_interval_ms = 10;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("api_url")));
        assert!(warnings.iter().any(|w| w.contains("poll_interval_ms")));
    }

    #[test]
    fn test_load_explicit_path_and_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut original = IssuedeskConfig::default();
        original.trajectory.poll_interval_ms = 500;
        std::fs::write(&path, original.to_toml_string().unwrap()).unwrap();

        let loaded = IssuedeskConfig::from_file(&path).unwrap();
        assert_eq!(loaded.trajectory.poll_interval_ms, 500);

        let missing = dir.path().join("missing.toml");
        assert!(IssuedeskConfig::load(Some(&missing)).is_err());
    }
}
