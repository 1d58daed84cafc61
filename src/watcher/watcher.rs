//! Storage root watcher using notify-rs.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::FileEvent;
use crate::error::WatcherError;
use crate::Result;

/// Capacity of the raw event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Watches one storage root recursively and forwards arrival events.
///
/// The root is canonicalized so that it prefixes the absolute paths
/// notify reports, even when configured as a relative path.
pub struct FileWatcher {
    // Held for its Drop; dropping it stops the OS watch.
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<FileEvent>,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or cannot be watched.
    pub fn watch_root(root: impl AsRef<Path>) -> Result<Self> {
        let requested = root.as_ref();
        let root = requested
            .canonicalize()
            .map_err(|e| watch_failed(requested, e))?;
        if !root.is_dir() {
            return Err(watch_failed(&root, "not a directory"));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forward_root = root.clone();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(&event) {
                        if !file_event.path().starts_with(&forward_root) {
                            continue;
                        }
                        if event_tx.blocking_send(file_event).is_err() {
                            tracing::debug!("Event receiver dropped, discarding file event");
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
        )
        .map_err(|e| watch_failed(&root, e))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| watch_failed(&root, e))?;
        tracing::info!(root = %root.display(), "Watching storage root");

        Ok(Self {
            _watcher: watcher,
            event_rx,
            root,
        })
    }

    /// The canonical storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receive the next arrival event.
    ///
    /// Returns `None` once the underlying watcher stops.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.event_rx.recv().await
    }
}

fn watch_failed(path: &Path, reason: impl std::fmt::Display) -> crate::Error {
    WatcherError::WatchFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
    .into()
}
