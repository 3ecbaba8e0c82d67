//! Periodic SLA reports.

use crate::channel::Manager;
use crate::probe::SharedProber;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Sends an SLA summary of the scheduled probers to every notifier
/// listening on their channels.
pub struct SlaReporter {
    manager: Arc<Manager>,
    probers: Arc<Vec<SharedProber>>,
    interval: Duration,
}

impl SlaReporter {
    pub fn new(manager: Arc<Manager>, probers: Vec<SharedProber>, interval: Duration) -> Self {
        Self {
            manager,
            probers: Arc::new(probers),
            interval,
        }
    }

    /// Report every `interval` until stopped. The first report goes out one
    /// full interval after start.
    pub async fn run(&self, mut stop_rx: broadcast::Receiver<()>) {
        tracing::info!("SLA report every {:?}", self.interval);
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = interval.tick() => self.report().await,
            }
        }
    }

    /// Send one report now and wait until every notifier has handled it.
    pub async fn report(&self) {
        let mut channels = Vec::new();
        for prober in self.probers.iter() {
            let declared = prober.read().await.channels();
            for channel in self.manager.resolve_channels(declared) {
                if !channels.contains(&channel) {
                    channels.push(channel);
                }
            }
        }

        let notifiers = self.manager.get_notifiers(&channels).await;
        let dry = self.manager.is_dry_notify();
        tracing::info!(
            dry,
            "Sending SLA report for {} probers to {} notifiers",
            self.probers.len(),
            notifiers.len()
        );

        let mut sends = JoinSet::new();
        for notifier in notifiers {
            let probers = self.probers.clone();
            sends.spawn(async move {
                if dry {
                    notifier.dry_notify_stat(&probers).await;
                } else {
                    notifier.notify_stat(&probers).await;
                }
            });
        }
        while let Some(joined) = sends.join_next().await {
            if let Err(e) = joined {
                tracing::error!("SLA report task failed: {}", e);
            }
        }
    }
}
