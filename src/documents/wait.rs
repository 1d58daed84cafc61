//! Polling for a document that is still downloading.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use super::DocumentLocator;
use crate::watcher::DocumentId;

/// Result of [`wait_for_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The document exists at this path.
    Ready(PathBuf),
    /// The timeout passed without the document appearing.
    NotReady,
}

/// Check for the document now, then every `interval` until `timeout` elapses.
pub async fn wait_for_document(
    locator: &DocumentLocator,
    id: &DocumentId,
    timeout: Duration,
    interval: Duration,
) -> WaitOutcome {
    if let Some(path) = locator.find(id) {
        return WaitOutcome::Ready(path);
    }

    tracing::info!(%id, timeout_secs = timeout.as_secs(), "Document not downloaded yet, waiting");
    let deadline = Instant::now() + timeout;

    loop {
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(%id, "Gave up waiting for document");
            return WaitOutcome::NotReady;
        }

        tokio::time::sleep(interval.min(deadline - now)).await;

        if let Some(path) = locator.find(id) {
            tracing::info!(%id, path = %path.display(), "Document arrived");
            return WaitOutcome::Ready(path);
        }
        tracing::debug!(
            %id,
            remaining_secs = deadline.saturating_duration_since(Instant::now()).as_secs(),
            "Still waiting for document"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(300);
    const INTERVAL: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ABCD1234");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("paper.pdf"), b"%PDF").unwrap();

        let start = Instant::now();
        let outcome = wait_for_document(
            &DocumentLocator::new(tmp.path()),
            &"ABCD1234".parse().unwrap(),
            TIMEOUT,
            INTERVAL,
        )
        .await;

        assert_eq!(outcome, WaitOutcome::Ready(dir.join("paper.pdf")));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_download() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ABCD1234");
        let locator = DocumentLocator::new(tmp.path());

        let writer = {
            let dir = dir.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(20)).await;
                fs::create_dir_all(&dir).unwrap();
                fs::write(dir.join("paper.pdf"), b"%PDF").unwrap();
            })
        };

        let start = Instant::now();
        let outcome =
            wait_for_document(&locator, &"ABCD1234".parse().unwrap(), TIMEOUT, INTERVAL).await;
        writer.await.unwrap();

        assert!(matches!(outcome, WaitOutcome::Ready(_)));
        // Found on the second poll.
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_after_timeout() {
        let tmp = TempDir::new().unwrap();
        let start = Instant::now();

        let outcome = wait_for_document(
            &DocumentLocator::new(tmp.path()),
            &"ABCD1234".parse().unwrap(),
            Duration::from_secs(40),
            INTERVAL,
        )
        .await;

        assert_eq!(outcome, WaitOutcome::NotReady);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }
}
