//! Time-bounded reservations of document identifiers.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::watcher::DocumentId;

/// Default reservation lifetime.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(120);

/// Identifiers reserved by a run, each with an expiry.
///
/// A reservation is taken when a run is accepted and either released
/// explicitly (failure, skip) or left to expire after the window.
#[derive(Debug)]
pub struct RecentlyProcessed {
    window: Duration,
    entries: Mutex<HashMap<DocumentId, Instant>>,
}

impl Default for RecentlyProcessed {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl RecentlyProcessed {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve `id`. Returns `false` if it already holds a live reservation.
    pub fn try_reserve(&self, id: &DocumentId) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires| *expires > now);

        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.clone(), now + self.window);
        true
    }

    /// Drop the reservation for `id`, if any.
    pub fn release(&self, id: &DocumentId) {
        self.entries.lock().remove(id);
    }

    /// Whether `id` holds a live reservation.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|expires| *expires > Instant::now())
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DocumentId {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reservation_refused() {
        let recent = RecentlyProcessed::default();
        let key = id("ABCD1234");

        assert!(recent.try_reserve(&key));
        assert!(!recent.try_reserve(&key));
        assert!(recent.contains(&key));
        assert!(recent.try_reserve(&id("WXYZ9876")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservation_expires() {
        let recent = RecentlyProcessed::new(Duration::from_secs(120));
        let key = id("ABCD1234");

        assert!(recent.try_reserve(&key));
        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(!recent.try_reserve(&key));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!recent.contains(&key));
        assert!(recent.try_reserve(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_allows_immediate_retry() {
        let recent = RecentlyProcessed::default();
        let key = id("ABCD1234");

        assert!(recent.try_reserve(&key));
        recent.release(&key);
        assert!(!recent.contains(&key));
        assert!(recent.try_reserve(&key));
    }
}
