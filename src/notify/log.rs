//! Notifier that writes through the tracing subscriber.

use super::{result_text, sla_summary, NotifyBase, NotifyError, NotifySettings, Notifier};
use crate::probe::SharedProber;
use crate::result::ProbeResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Emits one log event per notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogNotifier {
    #[serde(flatten)]
    pub base: NotifyBase,
}

impl LogNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            base: NotifyBase::new(name),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn kind(&self) -> &str {
        self.base.kind()
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn channels(&self) -> Vec<String> {
        self.base.channels()
    }

    fn config(&mut self, settings: &NotifySettings) -> Result<(), NotifyError> {
        self.base.configure("log", settings)
    }

    async fn notify(&self, result: &ProbeResult) {
        tracing::info!(
            notifier = %self.base.name,
            prober = %result.name,
            status = %result.status,
            "{}",
            result_text(result)
        );
    }

    async fn notify_stat(&self, probers: &[SharedProber]) {
        let summary = sla_summary(probers).await;
        tracing::info!(notifier = %self.base.name, "SLA report\n{}", summary);
    }

    async fn dry_notify(&self, result: &ProbeResult) {
        tracing::info!(
            notifier = %self.base.name,
            prober = %result.name,
            "[dry] would notify: {}",
            result.title()
        );
    }

    async fn dry_notify_stat(&self, probers: &[SharedProber]) {
        tracing::info!(
            notifier = %self.base.name,
            "[dry] would send SLA report for {} probers",
            probers.len()
        );
    }
}
