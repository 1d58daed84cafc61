//! Application wiring.
//!
//! Builds the pipeline from a [`Config`] and runs the top-level commands:
//! the watch loop, one-off and batch analysis, model listing and history.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::analysis::{
    AnalysisOrchestrator, BuiltinPrompt, Collaborators, FilePromptSource, OrchestratorConfig,
    PromptSource, RunReport, RunRequest,
};
use crate::config::Config;
use crate::documents::{wait_for_document, DocumentLocator, PdfTextExtractor, WaitOutcome};
use crate::models::{match_model, GenerationOptions, ModelInfo, OpenAiCompatBackend, Resolution};
use crate::notes::MarkdownNotesWriter;
use crate::notifications::ConsoleNotifier;
use crate::storage::{has_completed, init_storage, list_recent_runs, Database, RunRecord};
use crate::watcher::{DebounceConfig, Debouncer, DocumentFilter, DocumentId, FileWatcher};
use crate::Result;

/// Capacity of the settled-document channel.
const READY_CHANNEL_CAPACITY: usize = 64;

/// Result of a one-off analysis.
#[derive(Debug)]
pub enum AnalyzeOutcome {
    /// The document never appeared within the wait timeout.
    DocumentNotReady,
    /// A run took place (or was refused; see [`RunReport::skipped`]).
    Ran(Box<RunReport>),
}

/// Counts from a batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Refused by de-duplication.
    pub skipped: usize,
    /// Already completed according to the ledger.
    pub already_done: usize,
}

impl BatchSummary {
    /// Runs actually attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// The assembled application.
pub struct App {
    config: Config,
    orchestrator: Arc<AnalysisOrchestrator>,
    locator: DocumentLocator,
    ledger: Database,
}

impl App {
    /// Build the production pipeline from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be opened or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let ledger = Database::open(config.database_path())?;
        init_storage(&ledger)?;
        ledger.health_check()?;

        let locator = document_locator(&config);
        let backend = OpenAiCompatBackend::new(
            &config.endpoint,
            config.api_token.clone(),
            GenerationOptions {
                temperature: config.temperature,
                max_tokens: config.max_output_tokens,
            },
        )?;
        let prompts: Arc<dyn PromptSource> = match &config.prompt_path {
            Some(path) => Arc::new(FilePromptSource::new(path)),
            None => Arc::new(BuiltinPrompt),
        };

        let collaborators = Collaborators {
            extractor: Arc::new(PdfTextExtractor::new(
                locator.clone(),
                &config.pdftotext_command,
            )),
            backend: Arc::new(backend),
            writer: Arc::new(MarkdownNotesWriter::new(&config.notes_dir)),
            prompts,
            notifier: Arc::new(ConsoleNotifier::detect(config.confirm_auto_runs)),
        };

        Ok(Self::with_collaborators(config, collaborators, ledger))
    }

    /// Build the application around caller-supplied collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: Config,
        collaborators: Collaborators,
        ledger: Database,
    ) -> Self {
        let orchestrator = AnalysisOrchestrator::new(OrchestratorConfig::from(&config), collaborators)
            .with_ledger(ledger.clone());
        Self {
            locator: document_locator(&config),
            orchestrator: Arc::new(orchestrator),
            config,
            ledger,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<AnalysisOrchestrator> {
        &self.orchestrator
    }

    /// Watch the storage root until Ctrl+C or SIGTERM. SIGHUP clears the
    /// model cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be watched.
    pub async fn watch(&self) -> Result<()> {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let hangups = tokio::spawn(forward_hangups(refresh_tx));
        let result = self.watch_until(shutdown_signal(), refresh_rx).await;
        hangups.abort();
        result
    }

    /// Watch the storage root until `shutdown` completes.
    ///
    /// Each message on `refresh` invalidates the model cache, so the next run
    /// rediscovers the backend's models.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be watched.
    pub async fn watch_until(
        &self,
        shutdown: impl Future<Output = ()>,
        mut refresh: mpsc::Receiver<()>,
    ) -> Result<()> {
        let mut watcher = FileWatcher::watch_root(&self.config.storage_root)?;

        let (ready_tx, ready_rx) = mpsc::channel(READY_CHANNEL_CAPACITY);
        let debouncer = Debouncer::new(
            DebounceConfig {
                quiet: self.config.quiet_period(),
                settle: self.config.settle_period(),
            },
            watcher.root(),
            DocumentFilter::new(&self.config.document_extensions),
            ready_tx,
        );

        let cancel = CancellationToken::new();
        let pipeline = tokio::spawn(Arc::clone(&self.orchestrator).serve(ready_rx, cancel.clone()));

        tracing::info!(root = %watcher.root().display(), "Watching for new documents");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(()) = refresh.recv() => {
                    self.orchestrator.resolver().invalidate().await;
                    tracing::info!("Model cache cleared");
                }
                event = watcher.recv() => match event {
                    Some(event) => {
                        debouncer.notify(event.path());
                    }
                    None => {
                        tracing::warn!("File watcher stopped delivering events");
                        break;
                    }
                },
            }
        }

        tracing::info!(pending = debouncer.pending_count(), "Stopping watch loop");
        cancel.cancel();
        // Dropping the debouncer cancels its timers and closes the ready channel.
        drop(debouncer);

        if let Err(e) = pipeline.await {
            tracing::warn!(error = %e, "Analysis pipeline task ended abnormally");
        }
        Ok(())
    }

    /// Analyse one document on request. Ctrl+C cancels generation.
    ///
    /// With `wait`, polls for the PDF first using the configured timeout.
    pub async fn analyze(
        &self,
        id: DocumentId,
        model: Option<String>,
        wait: bool,
    ) -> AnalyzeOutcome {
        if wait {
            let outcome = wait_for_document(
                &self.locator,
                &id,
                self.config.pdf_wait_timeout(),
                self.config.pdf_wait_interval(),
            )
            .await;
            if outcome == WaitOutcome::NotReady {
                return AnalyzeOutcome::DocumentNotReady;
            }
        }

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, cancelling analysis");
                    cancel.cancel();
                }
            })
        };

        let mut request = RunRequest::manual(id).with_cancel(cancel);
        if let Some(model) = model {
            request = request.with_model(model);
        }
        let report = self.orchestrator.run(request).await;
        interrupt.abort();

        AnalyzeOutcome::Ran(Box::new(report))
    }

    /// Analyse every stored document not yet completed, one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub async fn batch(&self, limit: Option<usize>) -> Result<BatchSummary> {
        let ids = self.locator.list_ids();
        tracing::info!(documents = ids.len(), "Starting batch analysis");

        let mut summary = BatchSummary::default();
        for id in ids {
            if limit.is_some_and(|limit| summary.attempted() >= limit) {
                break;
            }
            if self
                .ledger
                .with_conn(|conn| has_completed(conn, id.as_str()))?
            {
                summary.already_done += 1;
                continue;
            }
            if summary.attempted() > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let report = self.orchestrator.run(RunRequest::manual(id)).await;
            if report.skipped.is_some() {
                summary.skipped += 1;
            } else if report.succeeded() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(?summary, "Batch analysis finished");
        Ok(summary)
    }

    /// Advertised models and what the preferred name resolves to.
    pub async fn models(&self) -> (Vec<ModelInfo>, Option<Resolution>) {
        let models = self.orchestrator.resolver().available_models().await;
        let resolution = match_model(&models, &self.config.preferred_model);
        (models, resolution)
    }

    /// Most recent runs from the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn history(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.ledger.with_conn(|conn| list_recent_runs(conn, limit))
    }
}

fn document_locator(config: &Config) -> DocumentLocator {
    DocumentLocator::new(&config.storage_root)
        .with_filter(DocumentFilter::new(&config.document_extensions))
}

/// Turn SIGHUP into model cache refresh requests.
#[cfg(unix)]
async fn forward_hangups(refresh: mpsc::Sender<()>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, model cache cannot be refreshed");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        tracing::info!("Received SIGHUP, refreshing model cache");
        // A refresh already queued covers this one.
        let _ = refresh.try_send(());
    }
}

#[cfg(not(unix))]
async fn forward_hangups(_refresh: mpsc::Sender<()>) {}

/// Wait for Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
