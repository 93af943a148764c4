//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Drawroom configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Outbound frames queued per connection before deliveries are dropped.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// Largest inbound WebSocket message accepted.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Close connections that stay silent this long. Unset means never.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    /// Max concurrent WebSocket connections from one IP. Unset means no cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections_per_ip: Option<u32>,

    /// Serve the embedded browser client at `/`.
    #[serde(default = "default_true")]
    pub ui: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            send_buffer: default_send_buffer(),
            max_message_bytes: default_max_message_bytes(),
            idle_timeout_secs: None,
            max_connections_per_ip: None,
            ui: true,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_send_buffer() -> usize {
    256
}

fn default_max_message_bytes() -> usize {
    1_048_576
}

fn default_true() -> bool {
    true
}

/// Settings for the reconnecting client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_url")]
    pub url: String,

    /// Delay between a dropped connection and the next attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_client_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_client_url() -> String {
    "ws://127.0.0.1:3000/ws".into()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "drawroom_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::DrawroomError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::DrawroomError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn client(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if gw.send_buffer == 0 {
                errors.push("gateway.send_buffer must be at least 1".to_string());
            }
            if gw.max_message_bytes < 1024 {
                warnings.push(format!(
                    "gateway.max_message_bytes is very small ({} bytes); draw frames may be rejected",
                    gw.max_message_bytes
                ));
            }
            if gw.idle_timeout_secs == Some(0) {
                errors.push("gateway.idle_timeout_secs cannot be 0".to_string());
            }
            if gw.max_connections_per_ip == Some(0) {
                errors.push("gateway.max_connections_per_ip cannot be 0".to_string());
            }
        }

        if let Some(client) = &self.client {
            if !client.url.starts_with("ws://") && !client.url.starts_with("wss://") {
                errors.push(format!("client.url must be a ws:// or wss:// URL: {}", client.url));
            }
            if client.reconnect_delay_ms == 0 {
                warnings.push("client.reconnect_delay_ms is 0; reconnects will spin".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!(
                    "Unknown logging.format '{}', falling back to plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Drawroom data: `~/.drawroom/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drawroom")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_DR_BIND", "127.0.0.1") };
        let input = r#"{"bind": "${TEST_DR_BIND}", "other": "plain"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("127.0.0.1"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_DR_BIND") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_DR_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway_port(), 3000);
        assert_eq!(config.gateway_bind(), "0.0.0.0");
        assert_eq!(config.gateway().send_buffer, 256);
        assert!(config.gateway().ui);
        assert_eq!(config.client().reconnect_delay_ms, 5_000);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_json5_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080, idle_timeout_secs: 300 },
                client: { url: "ws://example.test/ws" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let gw = config.gateway();
        assert_eq!(gw.port, 8080);
        assert_eq!(gw.idle_timeout_secs, Some(300));
        assert_eq!(gw.send_buffer, 256);
        assert!(gw.ui);
        assert_eq!(config.client().url, "ws://example.test/ws");
        assert_eq!(config.client().reconnect_delay_ms, 5_000);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ gateway: ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::DrawroomError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            gateway: Some(GatewayConfig {
                port: 4000,
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.gateway_port(), 4000);
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_logging_default_matches_serde_defaults() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.format, "plain");
        assert_eq!(logging.output, "stderr");

        let config = Config {
            logging: Some(logging),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(errors.is_empty());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["logging"]["format"], "plain");
        assert_eq!(json["logging"]["output"], "stderr");
    }

    #[test]
    fn test_logging_config_filters() {
        let json_str = r#"{
            "logging": {
                "format": "json",
                "filters": ["drawroom_gateway=debug", "drawroom_client=trace"]
            }
        }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "json");
        assert_eq!(logging.filters, vec!["drawroom_gateway=debug", "drawroom_client=trace"]);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            gateway: Some(GatewayConfig {
                port: 0,
                send_buffer: 0,
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("port")));
        assert!(errors.iter().any(|e| e.contains("send_buffer")));
    }

    #[test]
    fn test_validate_client_url() {
        let config = Config {
            client: Some(ClientConfig {
                url: "http://localhost:3000".into(),
                reconnect_delay_ms: 0,
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("client.url")));
        assert!(warnings.iter().any(|w| w.contains("reconnect_delay_ms")));
    }

    #[test]
    fn test_validate_default_is_clean() {
        let (warnings, errors) = Config::default().validate();
        assert!(warnings.is_empty());
        assert!(errors.is_empty());
    }
}
