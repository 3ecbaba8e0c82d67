//! probewatch - health probing daemon.

use probewatch::channel::Manager;
use probewatch::config::{ServerConfig, Settings};
use probewatch::db::{self, Store};
use probewatch::notify::{self, LogNotifier, Notifier};
use probewatch::probe;
use probewatch::scheduler::{Scheduler, SlaReporter};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("probewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting probewatch with settings from {}...", cfg.config_path);
    tracing::info!("Using result store at {}", cfg.data_path);
    let settings = Settings::load(&cfg.config_path)?;

    // Probers
    let probers = probe::configure_probers(settings.probers(), &settings.probe).await;
    if probers.is_empty() {
        tracing::warn!("No probers configured, nothing to watch");
    }

    // Restore previous results
    let store = Arc::new(Store::new(&cfg.data_path));
    let saved = match store.load() {
        Ok(saved) => saved,
        Err(e) => {
            tracing::error!("Failed to load saved results, starting fresh: {}", e);
            Default::default()
        }
    };
    let restored = db::restore_results(&probers, &saved).await;
    tracing::info!("Restored {} of {} results", restored, probers.len());

    // Notifiers
    let mut configured = settings.notifiers();
    if configured.is_empty() {
        tracing::info!("No notifiers configured, logging notifications");
        configured.push(Box::new(LogNotifier::new("log")) as Box<dyn Notifier>);
    }
    let notifiers = notify::configure_notifiers(configured, &settings.notify);

    // Channels
    let manager = Arc::new(Manager::new(&settings.default_channel));
    manager.set_dry_notify(cfg.dry_notify);
    if cfg.dry_notify {
        tracing::info!("Dry-run notifications enabled");
    }
    manager.set_probers(&probers).await;
    manager.set_notifiers(&notifiers).await;
    manager.config_all_channels().await?;
    manager.watch_for_all_events().await;

    // Start result store
    let (save_tx, save_rx) = mpsc::channel(probers.len().max(1) * 2);
    let saver = tokio::spawn(db::run_save_loop(save_rx, store, saved));

    // Start scheduler
    let scheduler = Scheduler::new(manager.clone(), save_tx, settings.probe.interval);
    scheduler.start(probers.clone()).await;

    let reporter = settings.sla_report.filter(|d| !d.is_zero()).map(|interval| {
        let reporter = SlaReporter::new(manager.clone(), probers.clone(), interval);
        let stop_rx = scheduler.subscribe_stop();
        tokio::spawn(async move { reporter.run(stop_rx).await })
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    scheduler.stop();
    scheduler.wait().await;
    if let Some(reporter) = reporter {
        reporter.await?;
    }
    manager.all_done().await;

    // The scheduler holds the last sender; dropping it flushes the store.
    drop(scheduler);
    saver.await?;

    tracing::info!("Bye");
    Ok(())
}
