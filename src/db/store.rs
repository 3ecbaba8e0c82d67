//! JSON file store for probe results.

use crate::probe::SharedProber;
use crate::result::ProbeResult;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// How often the save loop writes pending results.
pub const SAVE_INTERVAL: Duration = Duration::from_secs(2);

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Results keyed by prober name.
pub type ResultMap = HashMap<String, ProbeResult>;

/// A JSON file holding the latest result of each prober.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all saved results. A missing file is an empty store.
    pub fn load(&self) -> Result<ResultMap, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ResultMap::new()),
            Err(e) => return Err(e.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResultMap::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Replace the file contents with `results`.
    ///
    /// The data goes to a sibling temp file first and is renamed into place,
    /// so readers never see a half-written file.
    pub fn save(&self, results: &ResultMap) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let sorted: BTreeMap<_, _> = results.iter().collect();
        let data = serde_json::to_vec_pretty(&sorted)?;

        let tmp = self.temp_path();
        let guard = scopeguard::guard(tmp.clone(), |tmp| {
            let _ = fs::remove_file(tmp);
        });
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        scopeguard::ScopeGuard::into_inner(guard);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Overwrite each prober's result with the saved one of the same name.
/// Returns how many probers were restored.
pub async fn restore_results(probers: &[SharedProber], saved: &ResultMap) -> usize {
    let mut restored = 0;
    for prober in probers {
        let mut p = prober.write().await;
        let Some(result) = saved.get(p.name()) else {
            continue;
        };
        p.result_mut().restore_from(result);
        tracing::debug!(prober = %p.name(), status = %result.status, "Restored result");
        restored += 1;
    }
    restored
}

/// Collect results from the probe loops and write them out periodically.
///
/// Only the latest result of each prober is kept. Pending results are
/// flushed once more when every sender is gone.
pub async fn run_save_loop(mut rx: mpsc::Receiver<ProbeResult>, store: Arc<Store>, mut results: ResultMap) {
    let mut dirty = false;
    let mut interval = tokio::time::interval(SAVE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(result) => {
                        results.insert(result.name.clone(), result);
                        dirty = true;
                    }
                    None => {
                        if dirty {
                            flush(&store, &results).await;
                        }
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                if dirty {
                    flush(&store, &results).await;
                    dirty = false;
                }
            }
        }
    }
    tracing::info!("Result store closed");
}

async fn flush(store: &Arc<Store>, results: &ResultMap) {
    let store = store.clone();
    let snapshot = results.clone();
    let count = snapshot.len();
    match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
        Ok(Ok(())) => tracing::debug!("Saved {} results", count),
        Ok(Err(e)) => tracing::error!("Failed to save results: {}", e),
        Err(e) => tracing::error!("Save task failed: {}", e),
    }
}
