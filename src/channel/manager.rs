//! Registry of all channels in the process.

use super::{Channel, ChannelError};
use crate::notify::SharedNotifier;
use crate::probe::SharedProber;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

/// Channel used by probers and notifiers that do not name any.
pub const DEFAULT_CHANNEL: &str = "__default_channel__";

/// Owns every channel, the watch loops running over them and the dry-run
/// flag they share.
///
/// Registration is expected to finish before [`Manager::watch_for_all_events`];
/// the registry is still lock-protected so channels can be added later.
pub struct Manager {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    watchers: Mutex<JoinSet<()>>,
    dry_notify: Arc<AtomicBool>,
    default_channel: String,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL)
    }
}

impl Manager {
    pub fn new(default_channel: &str) -> Self {
        let default_channel = if default_channel.trim().is_empty() {
            DEFAULT_CHANNEL
        } else {
            default_channel
        };
        Self {
            channels: RwLock::new(HashMap::new()),
            watchers: Mutex::new(JoinSet::new()),
            dry_notify: Arc::new(AtomicBool::new(false)),
            default_channel: default_channel.to_string(),
        }
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    pub fn set_dry_notify(&self, dry: bool) {
        self.dry_notify.store(dry, Ordering::Relaxed);
    }

    pub fn is_dry_notify(&self) -> bool {
        self.dry_notify.load(Ordering::Relaxed)
    }

    /// Map an empty channel list to the default channel.
    pub fn resolve_channels(&self, channels: Vec<String>) -> Vec<String> {
        if channels.is_empty() {
            vec![self.default_channel.clone()]
        } else {
            channels
        }
    }

    /// Get the named channel, creating it if needed.
    pub async fn set_channel(&self, name: &str) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().await.get(name) {
            return channel.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(channel = name, "Creating channel");
                Arc::new(Channel::with_dry_notify(name, self.dry_notify.clone()))
            })
            .clone()
    }

    pub async fn get_channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    pub async fn get_all_channels(&self) -> HashMap<String, Arc<Channel>> {
        self.channels.read().await.clone()
    }

    pub async fn set_prober(&self, channel: &str, prober: Option<SharedProber>) {
        self.set_channel(channel).await.set_prober(prober).await;
    }

    pub async fn set_notify(&self, channel: &str, notifier: Option<SharedNotifier>) {
        self.set_channel(channel).await.set_notify(notifier).await;
    }

    /// Register each prober on every channel it declares.
    pub async fn set_probers(&self, probers: &[SharedProber]) {
        for prober in probers {
            let channels = self.resolve_channels(prober.read().await.channels());
            for channel in channels {
                self.set_prober(&channel, Some(prober.clone())).await;
            }
        }
    }

    /// Register each notifier on every channel it declares.
    pub async fn set_notifiers(&self, notifiers: &[SharedNotifier]) {
        for notifier in notifiers {
            for channel in self.resolve_channels(notifier.channels()) {
                self.set_notify(&channel, Some(notifier.clone())).await;
            }
        }
    }

    /// All notifiers attached to the given channels, once per name.
    pub async fn get_notifiers(&self, channels: &[String]) -> Vec<SharedNotifier> {
        let mut found: BTreeMap<String, SharedNotifier> = BTreeMap::new();
        for name in channels {
            let Some(channel) = self.get_channel(name).await else {
                continue;
            };
            for notifier in channel.notifiers().await {
                found
                    .entry(notifier.name().to_string())
                    .or_insert(notifier);
            }
        }
        found.into_values().collect()
    }

    /// Allocate mailboxes for every channel not configured yet.
    pub async fn config_all_channels(&self) -> Result<(), ChannelError> {
        for channel in self.get_all_channels().await.into_values() {
            if channel.is_configured() {
                continue;
            }
            channel.config().await?;
        }
        Ok(())
    }

    /// Start a watch loop for every channel. Channels already being watched
    /// are left alone.
    ///
    /// Each channel is claimed before its loop is spawned, so a second call
    /// made before the first loops run starts nothing.
    pub async fn watch_for_all_events(&self) {
        let channels = self.get_all_channels().await;
        let mut watchers = self.watchers.lock().await;
        for channel in channels.into_values() {
            if !channel.is_configured() {
                tracing::warn!(channel = %channel.name(), "Channel is not configured, not watching it");
                continue;
            }
            let Some(claim) = channel.try_claim_watch() else {
                continue;
            };
            watchers.spawn(async move { channel.watch_claimed(claim).await });
        }
        tracing::info!("Watching {} channels", watchers.len());
    }

    /// Stop every channel and wait for all watch loops to exit.
    pub async fn all_done(&self) {
        for channel in self.get_all_channels().await.values() {
            channel.done();
        }

        let mut watchers = self.watchers.lock().await;
        while let Some(joined) = watchers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Channel watch loop failed: {}", e);
            }
        }
        tracing::info!("All channels are done");
    }
}
