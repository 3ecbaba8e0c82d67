//! Channels bind a set of probers to a set of notifiers.
//!
//! Probers push results into a channel's mailbox; a single watch loop per
//! channel decides whether a result is worth alerting on and fans it out to
//! every notifier on its own task.

mod manager;

pub use manager::*;

use crate::notify::SharedNotifier;
use crate::probe::SharedProber;
use crate::result::ProbeResult;
use crate::status::Status;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use scopeguard::ScopeGuard;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Channel error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel '{0}' is not configured")]
    NotConfigured(String),
    #[error("channel '{0}' is already configured")]
    AlreadyConfigured(String),
    #[error("channel '{0}' is being watched")]
    Watching(String),
    #[error("channel '{0}' mailbox is closed")]
    Closed(String),
}

/// Mailbox and done signal allocated by [`Channel::config`].
struct Mailbox {
    tx: mpsc::Sender<ProbeResult>,
    rx: Mutex<mpsc::Receiver<ProbeResult>>,
    done_tx: mpsc::Sender<bool>,
    done_rx: Mutex<mpsc::Receiver<bool>>,
}

/// Exclusive right to run the watch loop of a channel. Dropping it lets the
/// channel be watched again.
pub type WatchClaim = ScopeGuard<Arc<AtomicBool>, fn(Arc<AtomicBool>)>;

fn release_watch(flag: Arc<AtomicBool>) {
    flag.store(false, Ordering::Release);
}

/// A named fan-out group of probers and notifiers.
pub struct Channel {
    name: String,
    probers: RwLock<HashMap<String, SharedProber>>,
    notifiers: RwLock<HashMap<String, SharedNotifier>>,
    mailbox: OnceLock<Mailbox>,
    is_watching: Arc<AtomicBool>,
    dry_notify: Arc<AtomicBool>,
}

impl Channel {
    /// Create an empty, unconfigured channel.
    pub fn new(name: &str) -> Self {
        Self::with_dry_notify(name, Arc::new(AtomicBool::new(false)))
    }

    /// Create an empty channel reading dry-run mode from a shared flag.
    pub fn with_dry_notify(name: &str, dry_notify: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_string(),
            probers: RwLock::new(HashMap::new()),
            notifiers: RwLock::new(HashMap::new()),
            mailbox: OnceLock::new(),
            is_watching: Arc::new(AtomicBool::new(false)),
            dry_notify,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a prober. `None` is ignored and the first registration of a
    /// name wins.
    pub async fn set_prober(&self, prober: Option<SharedProber>) {
        let Some(prober) = prober else {
            return;
        };
        let name = prober.read().await.name().to_string();

        let mut probers = self.probers.write().await;
        if probers.contains_key(&name) {
            tracing::warn!(
                channel = %self.name,
                prober = %name,
                "Prober already registered on channel, keeping the first one"
            );
            return;
        }
        probers.insert(name, prober);
    }

    /// Register a notifier. `None` is ignored and the first registration of
    /// a name wins.
    pub async fn set_notify(&self, notifier: Option<SharedNotifier>) {
        let Some(notifier) = notifier else {
            return;
        };
        let name = notifier.name().to_string();

        let mut notifiers = self.notifiers.write().await;
        if notifiers.contains_key(&name) {
            tracing::warn!(
                channel = %self.name,
                notifier = %name,
                "Notifier already registered on channel, keeping the first one"
            );
            return;
        }
        notifiers.insert(name, notifier);
    }

    pub async fn get_prober(&self, name: &str) -> Option<SharedProber> {
        self.probers.read().await.get(name).cloned()
    }

    pub async fn get_notifier(&self, name: &str) -> Option<SharedNotifier> {
        self.notifiers.read().await.get(name).cloned()
    }

    pub async fn probers(&self) -> Vec<SharedProber> {
        self.probers.read().await.values().cloned().collect()
    }

    pub async fn notifiers(&self) -> Vec<SharedNotifier> {
        self.notifiers.read().await.values().cloned().collect()
    }

    pub async fn prober_count(&self) -> usize {
        self.probers.read().await.len()
    }

    pub async fn notifier_count(&self) -> usize {
        self.notifiers.read().await.len()
    }

    /// Allocate the mailbox, sized to the registered probers, and the done
    /// signal. Runs once, after all probers are registered.
    pub async fn config(&self) -> Result<(), ChannelError> {
        if self.is_watching() {
            return Err(ChannelError::Watching(self.name.clone()));
        }

        let capacity = self.prober_count().await.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = mpsc::channel(1);
        let mailbox = Mailbox {
            tx,
            rx: Mutex::new(rx),
            done_tx,
            done_rx: Mutex::new(done_rx),
        };

        self.mailbox
            .set(mailbox)
            .map_err(|_| ChannelError::AlreadyConfigured(self.name.clone()))?;
        tracing::debug!(channel = %self.name, capacity, "Channel configured");
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.mailbox.get().is_some()
    }

    pub fn is_watching(&self) -> bool {
        self.is_watching.load(Ordering::Acquire)
    }

    /// Queue a result for the watch loop, waiting while the mailbox is full.
    pub async fn send(&self, result: ProbeResult) -> Result<(), ChannelError> {
        let mailbox = self
            .mailbox
            .get()
            .ok_or_else(|| ChannelError::NotConfigured(self.name.clone()))?;
        mailbox
            .tx
            .send(result)
            .await
            .map_err(|_| ChannelError::Closed(self.name.clone()))
    }

    /// Ask the watch loop to stop. Never blocks; returns `false` if the
    /// channel is unconfigured or a stop request is already pending.
    pub fn done(&self) -> bool {
        match self.mailbox.get() {
            Some(mailbox) => mailbox.done_tx.try_send(true).is_ok(),
            None => false,
        }
    }

    /// Take the watch flag if nobody holds it.
    pub fn try_claim_watch(&self) -> Option<WatchClaim> {
        self.is_watching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(scopeguard::guard(
            self.is_watching.clone(),
            release_watch as fn(Arc<AtomicBool>),
        ))
    }

    /// Consume results until [`Channel::done`] is called.
    ///
    /// At most one loop runs per channel; extra calls return immediately.
    /// A stop request sent while nobody is watching ends the next loop as
    /// soon as it starts.
    pub async fn watch_event(&self) {
        if !self.is_configured() {
            tracing::warn!(channel = %self.name, "Channel is not configured, cannot watch it");
            return;
        }
        let Some(claim) = self.try_claim_watch() else {
            tracing::warn!(channel = %self.name, "Channel is already being watched");
            return;
        };
        self.watch_claimed(claim).await;
    }

    /// Run the watch loop under an already taken claim.
    pub async fn watch_claimed(&self, _claim: WatchClaim) {
        let Some(mailbox) = self.mailbox.get() else {
            return;
        };

        let mut rx = mailbox.rx.lock().await;
        let mut done = mailbox.done_rx.lock().await;
        tracing::info!(channel = %self.name, "Watching for probe events");

        loop {
            tokio::select! {
                Some(result) = rx.recv() => self.dispatch(result).await,
                _ = done.recv() => {
                    tracing::info!(channel = %self.name, "Done signal received, stop watching");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, result: ProbeResult) {
        if !should_notify(&result) {
            tracing::debug!(
                channel = %self.name,
                prober = %result.name,
                status = %result.status,
                "No notification needed"
            );
            return;
        }

        let notifiers = self.notifiers().await;
        let dry = self.dry_notify.load(Ordering::Relaxed);
        tracing::info!(
            channel = %self.name,
            prober = %result.name,
            from = %result.pre_status,
            to = %result.status,
            dry,
            "Sending notification to {} notifiers",
            notifiers.len()
        );

        let result = Arc::new(result);
        for notifier in notifiers {
            let result = result.clone();
            tokio::spawn(async move {
                if dry {
                    notifier.dry_notify(&result).await;
                } else {
                    notifier.notify(&result).await;
                }
            });
        }
    }
}

/// Whether a result should be sent to notifiers.
///
/// The first healthy observation and unchanged statuses stay silent. The
/// one exception is a repeat alert for an ongoing failure when the
/// notification strategy fired for this round.
pub fn should_notify(result: &ProbeResult) -> bool {
    if result.pre_status == Status::Init && result.status == Status::Up {
        return false;
    }
    if result.status == result.pre_status {
        let data = &result.stat.notification_strategy_data;
        return !result.status.is_up() && data.notified > 1 && data.need_to_send_notification();
    }
    true
}
