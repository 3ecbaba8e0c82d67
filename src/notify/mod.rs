//! Notification module.
//!
//! Defines the [`Notifier`] capability the channels fan results out to,
//! the [`NotifyBase`] retry plumbing shared by the built-in notifiers, and
//! text rendering for results and SLA reports.

mod log;
mod webhook;

pub use log::*;
pub use webhook::*;

use crate::probe::SharedProber;
use crate::result::ProbeResult;
use crate::status::Status;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("endpoint returned status {code}: {body}")]
    Status { code: u16, body: String },
}

/// Bounded retry policy for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub times: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            times: 3,
            interval: Duration::from_secs(5),
        }
    }
}

/// Global defaults applied to every notifier at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub retry: Retry,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            retry: Retry::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can deliver results and SLA summaries to people.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    /// Channels this notifier listens on. Empty means the default channel.
    fn channels(&self) -> Vec<String>;
    fn config(&mut self, settings: &NotifySettings) -> Result<(), NotifyError>;
    async fn notify(&self, result: &ProbeResult);
    async fn notify_stat(&self, probers: &[SharedProber]);
    async fn dry_notify(&self, result: &ProbeResult);
    async fn dry_notify_stat(&self, probers: &[SharedProber]);
}

/// A configured notifier shared between channels.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Configuration common to the built-in notifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyBase {
    pub name: String,
    pub channels: Vec<String>,
    pub retry: Option<Retry>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    kind: String,
}

impl NotifyBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn configure(&mut self, kind: &str, settings: &NotifySettings) -> Result<(), NotifyError> {
        if self.name.trim().is_empty() {
            return Err(NotifyError::Config(format!("{} notifier has no name", kind)));
        }
        self.kind = kind.to_string();
        if self.retry.is_none() {
            self.retry = Some(settings.retry);
        }
        if self.timeout.map_or(true, |d| d.is_zero()) {
            self.timeout = Some(settings.timeout);
        }
        tracing::debug!(notifier = %self.name, kind, "Notifier configured");
        Ok(())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    pub fn retry(&self) -> Retry {
        self.retry.unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::from_secs(30))
    }

    /// Run `send` until it succeeds or the retry budget is spent.
    ///
    /// Failures are logged, never returned: a lost notification must not
    /// disturb the channel that dispatched it.
    pub async fn send_with_retry<F, Fut>(&self, what: &str, mut send: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), NotifyError>>,
    {
        let retry = self.retry();
        let attempts = retry.times.max(1);

        for attempt in 1..=attempts {
            match send().await {
                Ok(()) => {
                    tracing::debug!(notifier = %self.name, attempt, "Sent {}", what);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        notifier = %self.name,
                        kind = %self.kind,
                        "Attempt {}/{} to send {} failed: {}",
                        attempt,
                        attempts,
                        what,
                        e
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(retry.interval).await;
            }
        }

        tracing::error!(
            notifier = %self.name,
            kind = %self.kind,
            "Giving up on {} after {} attempts",
            what,
            attempts
        );
        false
    }
}

/// Configure every notifier and keep the ones that accepted their settings.
/// A notifier whose name was already taken is dropped as well.
pub fn configure_notifiers(
    notifiers: Vec<Box<dyn Notifier>>,
    settings: &NotifySettings,
) -> Vec<SharedNotifier> {
    let mut names = std::collections::HashSet::new();
    let mut configured = Vec::with_capacity(notifiers.len());
    for mut notifier in notifiers {
        if let Err(e) = notifier.config(settings) {
            tracing::error!(
                notifier = %notifier.name(),
                kind = %notifier.kind(),
                "Notifier disabled: {}",
                e
            );
            continue;
        }
        if !names.insert(notifier.name().to_string()) {
            tracing::error!(notifier = %notifier.name(), "Duplicate notifier name, skipped");
            continue;
        }
        configured.push(Arc::from(notifier));
    }
    configured
}

/// Multi-line description of a single result.
pub fn result_text(result: &ProbeResult) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", result.title());
    let _ = writeln!(text, "{}", result.message);
    let _ = write!(
        text,
        "Time: {} | Round trip: {}",
        result.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
        humantime::format_duration(truncate_millis(result.round_trip_time))
    );
    if result.status == Status::Up && result.pre_status != Status::Up && !result.recovery_duration.is_zero() {
        let _ = write!(
            text,
            " | Recovered after {}",
            humantime::format_duration(truncate_secs(result.recovery_duration))
        );
    }
    text
}

/// One line of an SLA report.
pub fn sla_line(result: &ProbeResult) -> String {
    let stat = &result.stat;
    format!(
        "{} ({}) {} SLA {:.2}% | up {} | down {} | checks {} | {}",
        result.name,
        result.endpoint,
        result.status.emoji(),
        stat.sla(),
        humantime::format_duration(truncate_secs(stat.up_time)),
        humantime::format_duration(truncate_secs(stat.down_time)),
        stat.total,
        result.message
    )
}

/// SLA report over all given probers.
pub async fn sla_summary(probers: &[SharedProber]) -> String {
    let mut lines = Vec::with_capacity(probers.len());
    for prober in probers {
        let p = prober.read().await;
        lines.push(sla_line(p.result()));
    }
    lines.join("\n")
}

fn truncate_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

fn truncate_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
