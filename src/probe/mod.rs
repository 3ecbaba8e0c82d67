//! Probe module for health monitoring.
//!
//! Defines the [`Prober`] capability consumed by the scheduler and channels,
//! the [`ProbeBase`] bookkeeping shared by the built-in probers, and the
//! HTTP, TCP and shell probers themselves.

mod http;
mod shell;
mod tcp;
mod text;

pub use http::*;
pub use shell::*;
pub use tcp::*;
pub use text::*;

use crate::result::{NotificationStrategyData, ProbeResult, Strategy, Threshold};
use crate::status::Status;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Interval used when neither the prober nor the settings name one.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);
/// Timeout used when neither the prober nor the settings name one.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("check failed: {0}")]
    Check(String),
}

/// Alert flood-control settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub strategy: Strategy,
    pub factor: u32,
    pub max_times: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Regular,
            factor: 1,
            max_times: 1,
        }
    }
}

/// Global defaults applied to every prober at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub threshold: Threshold,
    pub alert: AlertSettings,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            threshold: Threshold::default(),
            alert: AlertSettings::default(),
        }
    }
}

/// Anything that can perform a health check on a schedule.
#[async_trait]
pub trait Prober: Send + Sync {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    /// Channels this prober reports to. Empty means the default channel.
    fn channels(&self) -> Vec<String>;
    fn config(&mut self, settings: &ProbeSettings) -> Result<(), ProbeError>;
    /// Run one round and return a snapshot of the updated result.
    async fn probe(&mut self) -> ProbeResult;
    fn interval(&self) -> Duration;
    fn result(&self) -> &ProbeResult;
    fn result_mut(&mut self) -> &mut ProbeResult;
}

/// A prober shared between its scheduler loop, channels and reports.
pub type SharedProber = Arc<RwLock<dyn Prober>>;

/// Wrap a prober for sharing.
pub fn shared<P: Prober + 'static>(prober: P) -> SharedProber {
    Arc::new(RwLock::new(prober))
}

/// What a single check observed, before it is folded into the result.
#[derive(Debug, Clone)]
pub struct Observation {
    pub start: DateTime<Utc>,
    pub round_trip: Duration,
    pub status: Status,
    pub message: String,
}

/// Configuration and state common to the built-in probers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeBase {
    pub name: String,
    pub channels: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub threshold: Option<Threshold>,
    pub alert: Option<AlertSettings>,
    #[serde(skip)]
    kind: String,
    #[serde(skip)]
    resolved_threshold: Threshold,
    #[serde(skip)]
    result: ProbeResult,
}

impl ProbeBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Apply global defaults and create a fresh result for `endpoint`.
    pub fn configure(
        &mut self,
        kind: &str,
        endpoint: &str,
        settings: &ProbeSettings,
    ) -> Result<(), ProbeError> {
        if self.name.trim().is_empty() {
            return Err(ProbeError::Config(format!("{} prober has no name", kind)));
        }
        self.kind = kind.to_string();

        if self.interval.map_or(true, |d| d.is_zero()) {
            self.interval = Some(settings.interval);
        }
        if self.timeout.map_or(true, |d| d.is_zero()) {
            self.timeout = Some(settings.timeout);
        }
        self.resolved_threshold = self.threshold.unwrap_or(settings.threshold);

        let alert = self.alert.unwrap_or(settings.alert);
        if alert.strategy == Strategy::Unknown {
            tracing::warn!(
                prober = %self.name,
                "Unrecognized notification strategy, alerting on every failure"
            );
        }

        self.result = ProbeResult::new(&self.name, endpoint);
        self.result.stat.notification_strategy_data =
            NotificationStrategyData::new(alert.strategy, alert.factor, alert.max_times);
        self.result
            .stat
            .status_counter
            .set_max_len(self.resolved_threshold.window());

        tracing::debug!(
            prober = %self.name,
            kind = %self.kind,
            endpoint,
            interval = ?self.interval(),
            "Prober configured"
        );
        Ok(())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval.unwrap_or(DEFAULT_PROBE_INTERVAL)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn result(&self) -> &ProbeResult {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut ProbeResult {
        &mut self.result
    }

    /// Run `check` under this prober's timeout and time it.
    ///
    /// `Ok` carries the success message; any error marks the round as
    /// failed. Configuration errors surface as `Unknown`.
    pub async fn observe<F>(&self, check: F) -> Observation
    where
        F: Future<Output = Result<String, ProbeError>>,
    {
        let start = Utc::now();
        let timer = Instant::now();
        let timeout = self.timeout();

        let outcome = match tokio::time::timeout(timeout, check).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };
        let round_trip = timer.elapsed();

        let (status, message) = match outcome {
            Ok(message) => (Status::Up, message),
            Err(e @ ProbeError::Config(_)) => (Status::Unknown, e.to_string()),
            Err(e) => (Status::Down, e.to_string()),
        };

        Observation {
            start,
            round_trip,
            status,
            message,
        }
    }

    /// Fold an observation into the result and return a snapshot.
    pub fn record(&mut self, observation: Observation) -> ProbeResult {
        let period = self.interval();
        self.result.finish_round(
            observation.start,
            observation.round_trip,
            observation.status,
            observation.message,
            self.resolved_threshold,
            period,
        );

        if self.result.status_changed() {
            tracing::info!(
                prober = %self.name,
                from = %self.result.pre_status,
                to = %self.result.status,
                "Status changed: {}",
                self.result.message
            );
        } else {
            tracing::debug!(
                prober = %self.name,
                status = %self.result.status,
                rtt = ?self.result.round_trip_time,
                "{}",
                self.result.message
            );
        }

        self.result.clone()
    }
}

/// Configure every prober, marking failures `Bad` and leaving them out.
///
/// Names must be unique; a later prober reusing a name is rejected.
pub async fn configure_probers(
    probers: Vec<SharedProber>,
    settings: &ProbeSettings,
) -> Vec<SharedProber> {
    let mut names = HashSet::new();
    let mut valid = Vec::with_capacity(probers.len());

    for prober in probers {
        let mut p = prober.write().await;
        let outcome = if names.contains(p.name()) {
            Err(ProbeError::Config(format!("duplicate prober name '{}'", p.name())))
        } else {
            p.config(settings)
        };

        match outcome {
            Ok(()) => {
                names.insert(p.name().to_string());
                drop(p);
                valid.push(prober);
            }
            Err(e) => {
                tracing::error!(
                    prober = %p.name(),
                    kind = %p.kind(),
                    "Prober configuration failed, not scheduling it: {}",
                    e
                );
                let name = p.name().to_string();
                let result = p.result_mut();
                result.name = name;
                result.status = Status::Bad;
                result.message = e.to_string();
            }
        }
    }

    tracing::info!("{} probers configured successfully", valid.len());
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProber;

    #[test]
    fn test_configure_applies_defaults() {
        let mut base = ProbeBase::new("api");
        let settings = ProbeSettings {
            interval: Duration::from_secs(15),
            alert: AlertSettings {
                strategy: Strategy::Increment,
                factor: 2,
                max_times: 4,
            },
            ..Default::default()
        };
        base.configure("http", "http://api", &settings).unwrap();

        assert_eq!(base.interval(), Duration::from_secs(15));
        assert_eq!(base.timeout(), DEFAULT_PROBE_TIMEOUT);
        assert_eq!(base.result().name, "api");
        assert_eq!(base.result().endpoint, "http://api");
        let data = &base.result().stat.notification_strategy_data;
        assert_eq!(data.strategy, Strategy::Increment);
        assert_eq!(data.factor, 2);
        assert_eq!(data.max_times, 4);
    }

    #[test]
    fn test_configure_rejects_empty_name() {
        let mut base = ProbeBase::default();
        let err = base.configure("tcp", "db:5432", &ProbeSettings::default());
        assert!(matches!(err, Err(ProbeError::Config(_))));
    }

    #[tokio::test]
    async fn test_observe_maps_outcomes() {
        let mut base = ProbeBase::new("x");
        base.configure("test", "nowhere", &ProbeSettings::default()).unwrap();

        let up = base.observe(async { Ok("fine".to_string()) }).await;
        assert_eq!(up.status, Status::Up);
        assert_eq!(up.message, "fine");

        let down = base
            .observe(async { Err(ProbeError::Network("refused".into())) })
            .await;
        assert_eq!(down.status, Status::Down);
        assert!(down.message.contains("refused"));

        let unknown = base
            .observe(async { Err(ProbeError::Config("bad".into())) })
            .await;
        assert_eq!(unknown.status, Status::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_times_out() {
        let mut base = ProbeBase::new("slow");
        base.timeout = Some(Duration::from_millis(50));
        base.configure("test", "nowhere", &ProbeSettings::default()).unwrap();

        let obs = base
            .observe(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            })
            .await;
        assert_eq!(obs.status, Status::Down);
        assert!(obs.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_configure_probers_marks_bad_and_duplicates() {
        let good = shared(TcpProber::new("db", "127.0.0.1:5432"));
        let dup = shared(TcpProber::new("db", "127.0.0.1:5433"));
        let broken = shared(TcpProber::new("cache", ""));
        let scripted = ScriptedProber::new("queue")
            .failing_config("no broker")
            .build();

        let valid = configure_probers(
            vec![good.clone(), dup.clone(), broken.clone(), scripted.clone()],
            &ProbeSettings::default(),
        )
        .await;

        assert_eq!(valid.len(), 1);
        assert!(Arc::ptr_eq(&valid[0], &good));

        let dup = dup.read().await;
        assert_eq!(dup.result().status, Status::Bad);
        assert_eq!(dup.result().name, "db");
        assert!(dup.result().message.contains("duplicate prober name"));

        let broken = broken.read().await;
        assert_eq!(broken.result().status, Status::Bad);
        assert_eq!(broken.result().name, "cache");
        assert!(broken.result().message.contains("invalid configuration"));

        let scripted = scripted.read().await;
        assert_eq!(scripted.result().status, Status::Bad);
        assert_eq!(scripted.result().name, "queue");
        assert!(scripted.result().message.contains("no broker"));
    }
}
