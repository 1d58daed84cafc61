//! Per-document debouncing of arrivals.
//!
//! A download typically shows up as a create, a few partial writes and a
//! rename, sometimes under more than one file name in the same item folder.
//! Each notification cancels the pending timer for its document and starts a
//! new one, so only the last notification of a burst fires and a document
//! never has more than one live timer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::filter::DocumentFilter;
use super::identifier::{extract_identifier, DocumentId};
use crate::metrics;

/// Quiet period after the last event before a document fires.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(3);

/// Extra wait after firing, letting the originating write finish.
pub const DEFAULT_SETTLE_PERIOD: Duration = Duration::from_secs(5);

/// A document that arrived and settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReady {
    /// Identifier derived from the path.
    pub id: DocumentId,
    /// Where the document was last seen.
    pub path: PathBuf,
}

/// Debouncer timing.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Quiet period restarted by every event.
    pub quiet: Duration,
    /// Grace period between firing and the existence re-check.
    pub settle: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet: DEFAULT_QUIET_PERIOD,
            settle: DEFAULT_SETTLE_PERIOD,
        }
    }
}

struct PendingEvent {
    generation: u64,
    path: PathBuf,
    handle: JoinHandle<()>,
}

struct Shared {
    config: DebounceConfig,
    storage_root: PathBuf,
    pending: Mutex<HashMap<DocumentId, PendingEvent>>,
    ready_tx: mpsc::Sender<DocumentReady>,
}

impl Shared {
    /// Drop the registry entry for `id` if it still belongs to `generation`.
    fn finish(&self, id: &DocumentId, generation: u64) {
        let mut pending = self.pending.lock();
        if pending
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
        {
            pending.remove(id);
        }
        set_pending_gauge(pending.len());
    }
}

/// Coalesces bursts of file events into one [`DocumentReady`] per document.
pub struct Debouncer {
    shared: Arc<Shared>,
    filter: DocumentFilter,
    next_generation: AtomicU64,
}

impl Debouncer {
    /// Create a debouncer delivering settled documents to `ready_tx`.
    #[must_use]
    pub fn new(
        config: DebounceConfig,
        storage_root: impl Into<PathBuf>,
        filter: DocumentFilter,
        ready_tx: mpsc::Sender<DocumentReady>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                storage_root: storage_root.into(),
                pending: Mutex::new(HashMap::new()),
                ready_tx,
            }),
            filter,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Register an event for `path`.
    ///
    /// Returns `false` if the path is not a document or names no document
    /// key, in which case it was ignored. Must be called from within a Tokio
    /// runtime.
    pub fn notify(&self, path: &Path) -> bool {
        if !self.filter.is_document(path) {
            tracing::trace!(path = %path.display(), "Ignoring non-document event");
            return false;
        }

        let Some(id) = extract_identifier(path, &self.shared.storage_root) else {
            tracing::warn!(
                path = %path.display(),
                root = %self.shared.storage_root.display(),
                "No document key in path, dropping event"
            );
            return false;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.shared.pending.lock();

        if let Some(previous) = pending.remove(&id) {
            previous.handle.abort();
            tracing::debug!(%id, path = %path.display(), "Restarting debounce timer");
        }

        let handle = tokio::spawn(fire(
            Arc::clone(&self.shared),
            id.clone(),
            path.to_path_buf(),
            generation,
        ));
        pending.insert(
            id,
            PendingEvent {
                generation,
                path: path.to_path_buf(),
                handle,
            },
        );
        set_pending_gauge(pending.len());

        true
    }

    /// Number of documents with a live timer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Whether `id` has a live timer.
    #[must_use]
    pub fn is_pending(&self, id: &DocumentId) -> bool {
        self.shared.pending.lock().contains_key(id)
    }

    /// The latest path seen for a pending `id`.
    #[must_use]
    pub fn pending_path(&self, id: &DocumentId) -> Option<PathBuf> {
        self.shared.pending.lock().get(id).map(|e| e.path.clone())
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        let mut pending = self.shared.pending.lock();
        for (_, entry) in pending.drain() {
            entry.handle.abort();
        }
        set_pending_gauge(0);
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn fire(shared: Arc<Shared>, id: DocumentId, path: PathBuf, generation: u64) {
    tokio::time::sleep(shared.config.quiet).await;

    tracing::debug!(%id, path = %path.display(), "Debounce fired, waiting for write to settle");
    tokio::time::sleep(shared.config.settle).await;

    if !path.exists() {
        tracing::debug!(%id, path = %path.display(), "Document vanished before settling");
        shared.finish(&id, generation);
        return;
    }

    shared.finish(&id, generation);
    tracing::info!(%id, path = %path.display(), "New document ready");

    if shared.ready_tx.send(DocumentReady { id, path }).await.is_err() {
        tracing::warn!("Document receiver closed, dropping ready event");
    }
}

#[allow(clippy::cast_possible_wrap)]
fn set_pending_gauge(len: usize) {
    metrics::PENDING_EVENTS.set(len as i64);
}
