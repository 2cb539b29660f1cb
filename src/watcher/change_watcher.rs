//! Content-change watcher for script files.
//!
//! Raw file system notifications are noisy: editors write in several steps
//! and metadata touches fire too. Each watched script gets a lockout window
//! after the first notification; once it passes, the content digest decides
//! whether anything actually changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::digest::ContentDigest;
use super::error::WatchError;

/// Events emitted by the change watcher.
#[derive(Debug)]
pub enum WatchEvent {
    /// The script's content differs from the last known digest.
    Changed { script_name: String },
    /// The script could not be re-read after a notification.
    Failed {
        script_name: String,
        error: WatchError,
    },
}

impl WatchEvent {
    #[must_use]
    pub fn script_name(&self) -> &str {
        match self {
            Self::Changed { script_name } | Self::Failed { script_name, .. } => script_name,
        }
    }
}

/// One watched script.
struct WatchEntry {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    debouncer: JoinHandle<()>,
}

impl Drop for WatchEntry {
    fn drop(&mut self) {
        // Cancels a pending lockout as well.
        self.debouncer.abort();
    }
}

/// Watches script files in one directory for content changes.
///
/// Watches are owned by the instance; dropping it ends all of them.
pub struct ChangeWatcher {
    base_dir: PathBuf,
    debounce: Duration,
    events: mpsc::UnboundedSender<WatchEvent>,
    entries: HashMap<String, WatchEntry>,
}

impl ChangeWatcher {
    /// Create a watcher for scripts under `base_dir`.
    ///
    /// Returns the watcher and a receiver for change events.
    #[must_use]
    pub fn new(
        base_dir: impl Into<PathBuf>,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                base_dir: base_dir.into(),
                debounce,
                events,
                entries: HashMap::new(),
            },
            rx,
        )
    }

    /// Start watching `script_name`, replacing any earlier watch on it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Read`] if the script cannot be read, or
    /// [`WatchError::Notify`] if the notification backend fails.
    pub fn watch(&mut self, script_name: &str) -> Result<(), WatchError> {
        let requested = self.base_dir.join(script_name);
        let path = requested
            .canonicalize()
            .map_err(|e| WatchError::read(&requested, e))?;
        let digest = ContentDigest::of_file(&path)?;

        if self.entries.remove(script_name).is_some() {
            tracing::debug!(script = %script_name, "Replacing existing watch");
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    if is_relevant(&event, &target) {
                        let _ = raw_tx.send(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })?;
        let parent = path.parent().unwrap_or(path.as_path());
        watcher.watch(parent, RecursiveMode::NonRecursive)?;

        let debouncer = tokio::spawn(debounce_changes(
            script_name.to_string(),
            path.clone(),
            digest,
            self.debounce,
            raw_rx,
            self.events.clone(),
        ));

        tracing::info!(script = %script_name, path = %path.display(), %digest, "Watching script");
        self.entries.insert(
            script_name.to_string(),
            WatchEntry {
                path,
                _watcher: watcher,
                debouncer,
            },
        );
        Ok(())
    }

    /// Stop watching `script_name`. Unknown names are ignored.
    pub fn unwatch(&mut self, script_name: &str) -> bool {
        let removed = self.entries.remove(script_name);
        if let Some(entry) = &removed {
            tracing::info!(script = %script_name, path = %entry.path.display(), "Stopped watching script");
        }
        removed.is_some()
    }

    /// Stop every watch.
    pub fn unwatch_all(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(count = self.entries.len(), "Stopping all watches");
        }
        self.entries.clear();
    }

    #[must_use]
    pub fn is_watching(&self, script_name: &str) -> bool {
        self.entries.contains_key(script_name)
    }

    /// Watched script names, sorted.
    #[must_use]
    pub fn watched(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("base_dir", &self.base_dir)
            .field("debounce", &self.debounce)
            .field("watched", &self.watched())
            .finish()
    }
}

/// True for notifications that may mean the file's content changed.
fn is_relevant(event: &notify::Event, target: &Path) -> bool {
    if !event.paths.iter().any(|p| p == target) {
        return false;
    }
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

/// Turn raw notifications into at most one check per lockout window.
async fn debounce_changes(
    script_name: String,
    path: PathBuf,
    mut digest: ContentDigest,
    window: Duration,
    mut raw: mpsc::UnboundedReceiver<()>,
    events: mpsc::UnboundedSender<WatchEvent>,
) {
    while raw.recv().await.is_some() {
        tokio::time::sleep(window).await;
        // Everything that arrived during the lockout is covered by this check.
        while raw.try_recv().is_ok() {}

        let event = match ContentDigest::of_file_async(path.clone()).await {
            Ok(current) if current == digest => {
                tracing::trace!(script = %script_name, "Notification without content change");
                continue;
            }
            Ok(current) => {
                tracing::debug!(script = %script_name, old = %digest, new = %current, "Script changed");
                digest = current;
                WatchEvent::Changed {
                    script_name: script_name.clone(),
                }
            }
            Err(error) => {
                tracing::warn!(script = %script_name, %error, "Failed to re-read watched script");
                WatchEvent::Failed {
                    script_name: script_name.clone(),
                    error,
                }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }
}
