//! A set of helpers for testing

use crate::notify::{NotifyError, NotifySettings, Notifier, SharedNotifier};
use crate::probe::{ProbeError, ProbeSettings, Prober, SharedProber};
use crate::result::{ProbeResult, Threshold};
use crate::status::Status;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// A prober that replays a fixed list of statuses.
pub struct ScriptedProber {
    name: String,
    channels: Vec<String>,
    interval: Duration,
    script: Vec<Status>,
    config_error: Option<String>,
    result: ProbeResult,
    probes: Arc<AtomicUsize>,
}

impl ScriptedProber {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            channels: Vec::new(),
            interval: Duration::from_secs(10),
            script: vec![Status::Up],
            config_error: None,
            result: ProbeResult::new(name, "scripted"),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn channels(mut self, channels: &[&str]) -> Self {
        self.channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn script(mut self, script: &[Status]) -> Self {
        self.script = script.to_vec();
        self
    }

    pub fn failing_config(mut self, error: &str) -> Self {
        self.config_error = Some(error.to_string());
        self
    }

    /// Counter incremented on every `probe` call.
    pub fn probe_counter(&self) -> Arc<AtomicUsize> {
        self.probes.clone()
    }

    pub fn build(self) -> SharedProber {
        Arc::new(RwLock::new(self))
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    fn kind(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    fn config(&mut self, _settings: &ProbeSettings) -> Result<(), ProbeError> {
        match &self.config_error {
            Some(e) => Err(ProbeError::Config(e.clone())),
            None => Ok(()),
        }
    }

    async fn probe(&mut self) -> ProbeResult {
        let n = self.probes.fetch_add(1, Ordering::SeqCst);
        let raw = self.script[n % self.script.len()];
        self.result.finish_round(
            Utc::now(),
            Duration::from_millis(1),
            raw,
            format!("round {}", n),
            Threshold::default(),
            self.interval,
        );
        self.result.clone()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn result(&self) -> &ProbeResult {
        &self.result
    }

    fn result_mut(&mut self) -> &mut ProbeResult {
        &mut self.result
    }
}

/// Which notifier entry point was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Notify,
    DryNotify,
    NotifyStat,
    DryNotifyStat,
}

/// One recorded notifier invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub notifier: String,
    pub kind: CallKind,
    /// Prober name for single results, prober count for stat reports.
    pub subject: String,
    pub status: Status,
}

/// A notifier that reports every invocation on an mpsc channel.
pub struct RecordingNotifier {
    name: String,
    channels: Vec<String>,
    calls: mpsc::UnboundedSender<Call>,
}

impl RecordingNotifier {
    pub fn new(name: &str, calls: mpsc::UnboundedSender<Call>) -> Self {
        Self {
            name: name.to_string(),
            channels: Vec::new(),
            calls,
        }
    }

    pub fn channels(mut self, channels: &[&str]) -> Self {
        self.channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn build(self) -> SharedNotifier {
        Arc::new(self)
    }

    fn record(&self, kind: CallKind, subject: String, status: Status) {
        let _ = self.calls.send(Call {
            notifier: self.name.clone(),
            kind,
            subject,
            status,
        });
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &str {
        "recording"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    fn config(&mut self, _settings: &NotifySettings) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn notify(&self, result: &ProbeResult) {
        self.record(CallKind::Notify, result.name.clone(), result.status);
    }

    async fn notify_stat(&self, probers: &[SharedProber]) {
        self.record(CallKind::NotifyStat, probers.len().to_string(), Status::Init);
    }

    async fn dry_notify(&self, result: &ProbeResult) {
        self.record(CallKind::DryNotify, result.name.clone(), result.status);
    }

    async fn dry_notify_stat(&self, probers: &[SharedProber]) {
        self.record(CallKind::DryNotifyStat, probers.len().to_string(), Status::Init);
    }
}

/// A result snapshot with the given transition.
pub fn transition(name: &str, pre: Status, status: Status) -> ProbeResult {
    let mut result = ProbeResult::new(name, "test");
    result.pre_status = pre;
    result.status = status;
    result
}

/// Receive exactly `n` calls, failing if they do not arrive within a second.
pub async fn expect_calls(rx: &mut mpsc::UnboundedReceiver<Call>, n: usize) -> Vec<Call> {
    let mut calls = Vec::with_capacity(n);
    for _ in 0..n {
        let call = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for notifier call")
            .expect("call channel closed");
        calls.push(call);
    }
    calls
}
