//! Configuration module for probewatch.
//!
//! Process-level options come from environment variables with sensible
//! defaults; the probers and notifiers to run come from a JSON settings file.

use crate::channel::DEFAULT_CHANNEL;
use crate::notify::{LogNotifier, Notifier, NotifySettings, WebhookNotifier};
use crate::probe::{shared, HttpProber, ProbeSettings, SharedProber, ShellProber, TcpProber};

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the JSON settings file (default: "probewatch.json")
    pub config_path: String,
    /// Path to the result store (default: "data/probewatch.json")
    pub data_path: String,
    /// Log notifications instead of sending them (default: false)
    pub dry_notify: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: "probewatch.json".to_string(),
            data_path: "data/probewatch.json".to_string(),
            dry_notify: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PROBEWATCH_CONFIG`: settings file path (default: "probewatch.json")
    /// - `PROBEWATCH_DATA_PATH`: result store path (default: "data/probewatch.json")
    /// - `PROBEWATCH_DRY_NOTIFY`: "1", "true" or "yes" to enable dry-run notifications
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();

        if let Some(path) = lookup("PROBEWATCH_CONFIG").filter(|p| !p.is_empty()) {
            cfg.config_path = path;
        }

        if let Some(path) = lookup("PROBEWATCH_DATA_PATH").filter(|p| !p.is_empty()) {
            cfg.data_path = path;
        }

        if let Some(dry) = lookup("PROBEWATCH_DRY_NOTIFY") {
            cfg.dry_notify = matches!(dry.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        cfg
    }
}

/// Contents of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub probe: ProbeSettings,
    pub notify: NotifySettings,
    /// Interval between SLA reports. No reports when absent.
    #[serde(with = "humantime_serde")]
    pub sla_report: Option<Duration>,
    pub default_channel: String,
    pub http: Vec<HttpProber>,
    pub tcp: Vec<TcpProber>,
    pub shell: Vec<ShellProber>,
    pub log: Vec<LogNotifier>,
    pub webhook: Vec<WebhookNotifier>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe: ProbeSettings::default(),
            notify: NotifySettings::default(),
            sla_report: None,
            default_channel: DEFAULT_CHANNEL.to_string(),
            http: Vec::new(),
            tcp: Vec::new(),
            shell: Vec::new(),
            log: Vec::new(),
            webhook: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Settings file {} not found, using defaults", shown);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: shown,
                    source,
                })
            }
        };
        Self::parse(&data).map_err(|source| ConfigError::Parse {
            path: shown,
            source,
        })
    }

    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// All configured probers, not yet configured.
    pub fn probers(&self) -> Vec<SharedProber> {
        let mut probers = Vec::with_capacity(self.http.len() + self.tcp.len() + self.shell.len());
        probers.extend(self.http.iter().cloned().map(shared));
        probers.extend(self.tcp.iter().cloned().map(shared));
        probers.extend(self.shell.iter().cloned().map(shared));
        probers
    }

    /// All configured notifiers, not yet configured.
    pub fn notifiers(&self) -> Vec<Box<dyn Notifier>> {
        let mut notifiers: Vec<Box<dyn Notifier>> =
            Vec::with_capacity(self.log.len() + self.webhook.len());
        for n in &self.log {
            notifiers.push(Box::new(n.clone()));
        }
        for n in &self.webhook {
            notifiers.push(Box::new(n.clone()));
        }
        notifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Strategy;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.config_path, "probewatch.json");
        assert_eq!(cfg.data_path, "data/probewatch.json");
        assert!(!cfg.dry_notify);
    }

    #[test]
    fn test_config_from_env() {
        let vars: HashMap<&str, &str> = [
            ("PROBEWATCH_CONFIG", "/etc/probewatch.json"),
            ("PROBEWATCH_DATA_PATH", ""),
            ("PROBEWATCH_DRY_NOTIFY", "True"),
        ]
        .into_iter()
        .collect();
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.config_path, "/etc/probewatch.json");
        assert_eq!(cfg.data_path, "data/probewatch.json");
        assert!(cfg.dry_notify);
    }

    #[test]
    fn test_parse_settings() {
        let settings = Settings::parse(
            r#"{
                "probe": {
                    "interval": "30s",
                    "threshold": {"success": 2, "failure": 3},
                    "alert": {"strategy": "increment", "factor": 2, "max_times": 5}
                },
                "notify": {"retry": {"times": 2, "interval": "1s"}},
                "sla_report": "1day",
                "http": [{"name": "site", "url": "https://example.com", "channels": ["web"], "contain": "Example"}],
                "tcp": [{"name": "db", "host": "db:5432", "interval": "10s"}],
                "shell": [{"name": "disk", "cmd": "df", "args": ["-h"]}],
                "log": [{"name": "log"}],
                "webhook": [{"name": "hook", "url": "http://hooks.local/alert", "channels": ["web"]}]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.probe.interval, Duration::from_secs(30));
        assert_eq!(settings.probe.timeout, Duration::from_secs(30));
        assert_eq!(settings.probe.threshold.failure, 3);
        assert_eq!(settings.probe.alert.strategy, Strategy::Increment);
        assert_eq!(settings.notify.retry.times, 2);
        assert_eq!(settings.sla_report, Some(Duration::from_secs(86400)));
        assert_eq!(settings.default_channel, DEFAULT_CHANNEL);
        assert_eq!(settings.http[0].base.channels, vec!["web"]);
        assert_eq!(settings.http[0].text.contain, "Example");
        assert_eq!(settings.tcp[0].base.interval, Some(Duration::from_secs(10)));
        assert_eq!(settings.shell[0].args, vec!["-h"]);
        assert_eq!(settings.probers().len(), 3);
        assert_eq!(settings.notifiers().len(), 2);
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(dir.path().join("missing.json")).unwrap();
        assert_eq!(settings.default_channel, DEFAULT_CHANNEL);
        assert!(settings.http.is_empty());
        assert!(settings.sla_report.is_none());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"probe": {"interval": "soon"}}"#).unwrap();
        assert!(matches!(Settings::load(&bad), Err(ConfigError::Parse { .. })));
    }
}
