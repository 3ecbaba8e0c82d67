//! Scheduler module for running probes on their own intervals.

mod sla;

pub use sla::*;

use crate::channel::Manager;
use crate::probe::SharedProber;
use crate::result::ProbeResult;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;

/// Delay between the first rounds of consecutive probers.
///
/// Spreads `count` probers over `default_interval`, except that a fleet
/// small enough to start within a minute at one per second just does that.
pub fn stagger_gap(default_interval: Duration, count: usize) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    if Duration::from_secs(count as u64) <= Duration::from_secs(60) {
        return Duration::from_secs(1);
    }
    default_interval / count as u32
}

/// Runs one independent probe loop per prober.
pub struct Scheduler {
    manager: Arc<Manager>,
    save_tx: mpsc::Sender<ProbeResult>,
    stop: broadcast::Sender<()>,
    default_interval: Duration,
    loops: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// Create a scheduler that reports to `manager` and hands every result
    /// to `save_tx` for persistence.
    pub fn new(
        manager: Arc<Manager>,
        save_tx: mpsc::Sender<ProbeResult>,
        default_interval: Duration,
    ) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            manager,
            save_tx,
            stop,
            default_interval,
            loops: Mutex::new(JoinSet::new()),
        }
    }

    /// Start monitoring the given (already configured) probers.
    pub async fn start(&self, probers: Vec<SharedProber>) {
        let gap = stagger_gap(self.default_interval, probers.len());
        tracing::info!(
            "Starting scheduler with {} probers, {:?} apart",
            probers.len(),
            gap
        );

        let mut loops = self.loops.lock().await;
        for (i, prober) in probers.into_iter().enumerate() {
            let delay = gap * i as u32;
            loops.spawn(run_probe_loop(
                prober,
                delay,
                self.manager.clone(),
                self.save_tx.clone(),
                self.stop.subscribe(),
            ));
        }
    }

    /// Ask every probe loop to stop after its current round.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    /// Wait for all probe loops to exit.
    pub async fn wait(&self) {
        let mut loops = self.loops.lock().await;
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Probe loop failed: {}", e);
            }
        }
    }

    /// A receiver for the stop signal, for tasks that should stop together
    /// with the probe loops.
    pub fn subscribe_stop(&self) -> broadcast::Receiver<()> {
        self.stop.subscribe()
    }
}

/// Run the probe loop for a single prober.
async fn run_probe_loop(
    prober: SharedProber,
    delay: Duration,
    manager: Arc<Manager>,
    save_tx: mpsc::Sender<ProbeResult>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let (name, channels, interval) = {
        let p = prober.read().await;
        (p.name().to_string(), p.channels(), p.interval())
    };
    let channels = manager.resolve_channels(channels);

    tokio::select! {
        _ = stop_rx.recv() => return,
        _ = tokio::time::sleep(delay) => {}
    }
    tracing::debug!(prober = %name, ?interval, "Probe loop started");

    'probe: loop {
        let result = prober.write().await.probe().await;

        if save_tx.send(result.clone()).await.is_err() {
            tracing::warn!(prober = %name, "Result store is gone, result not saved");
        }

        for channel_name in &channels {
            let Some(channel) = manager.get_channel(channel_name).await else {
                tracing::warn!(prober = %name, channel = %channel_name, "No such channel");
                continue;
            };
            // a full mailbox must not keep the loop from stopping
            tokio::select! {
                sent = channel.send(result.clone()) => {
                    if let Err(e) = sent {
                        tracing::error!(prober = %name, "Failed to send result: {}", e);
                    }
                }
                _ = stop_rx.recv() => break 'probe,
            }
        }

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!(prober = %name, "Probe loop stopped");
}
