//! Hot reload of the configuration file.
//!
//! # Data Flow
//! ```text
//! notify (parent directory) ──► events for the config file name
//!     → debounce task: wait until the file has been quiet for `debounce`
//!     → load_config (parse + validate)
//!     → skip if identical to the last delivered config
//!     → ConfigUpdates::recv
//! ```
//!
//! # Design Decisions
//! - The parent directory is watched so editors that save by rename keep
//!   triggering reloads
//! - A burst of writes yields a single reload of the final content
//! - Invalid files are logged and dropped; the current config stays in force

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AccessConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches one configuration file.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Quiet period required after the last change before reloading.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime.
    ///
    /// The file's current content is the baseline: only configs that differ
    /// from it (or from the last one delivered) are reported. Dropping the
    /// returned [`ConfigUpdates`] stops the watcher.
    pub fn spawn(self) -> Result<ConfigUpdates, notify::Error> {
        let file_name = self.path.file_name().map(OsString::from);
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|path| path.file_name().map(OsString::from) == file_name);
                    if relevant {
                        let _ = event_tx.send(());
                    }
                }
                Err(err) => tracing::error!(error = %err, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let baseline = load_config(&self.path).ok();
        let (update_tx, update_rx) = mpsc::channel(4);
        tokio::spawn(reload_loop(
            self.path.clone(),
            self.debounce,
            event_rx,
            update_tx,
            baseline,
        ));

        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");
        Ok(ConfigUpdates {
            updates: update_rx,
            _watcher: watcher,
        })
    }
}

/// Stream of validated configuration changes.
pub struct ConfigUpdates {
    updates: mpsc::Receiver<AccessConfig>,
    _watcher: RecommendedWatcher,
}

impl ConfigUpdates {
    pub async fn recv(&mut self) -> Option<AccessConfig> {
        self.updates.recv().await
    }
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::Sender<AccessConfig>,
    mut last: Option<AccessConfig>,
) {
    while events.recv().await.is_some() {
        // Settle: keep draining until nothing arrives for `debounce`.
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_config(&path) {
            Ok(config) if last.as_ref() == Some(&config) => {
                tracing::debug!(path = ?path, "Config file touched without changes");
            }
            Ok(config) => {
                tracing::info!(path = ?path, "Config file changed, reloading");
                last = Some(config.clone());
                if updates.send(config).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::error!(path = ?path, error = %err, "Config reload rejected; keeping current configuration");
            }
        }
    }
}
