//! Per-document analysis runs.
//!
//! A run walks `Queued → ExtractingText → SelectingModel → Generating →
//! WritingBack → Done`, leaving early into the failure state of the stage
//! that broke. Runs for different documents are independent tasks; a second
//! trigger for a document that holds a reservation is dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::context::{select_context, Coverage};
use super::prompt::{build_messages, extract_tags, strip_tags_line, PromptSource, PromptTemplate};
use super::recent::{RecentlyProcessed, DEFAULT_DEDUP_WINDOW};
use crate::config::Config;
use crate::documents::TextExtractor;
use crate::error::PipelineError;
use crate::metrics;
use crate::models::{ChatMessage, ModelBackend, ModelInfo, ModelResolver, Resolution};
use crate::notes::{AnalysisDocument, AnalysisWriter};
use crate::notifications::{Decision, Notification, Notifier};
use crate::observability::spans;
use crate::storage::{record_run, Database, RunRecord};
use crate::watcher::{DocumentId, DocumentReady};

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Queued,
    ExtractingText,
    SelectingModel,
    Generating,
    WritingBack,
    Done,
    FailedExtraction,
    FailedNoModel,
    FailedGeneration,
    FailedWriteback,
}

impl RunState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done
                | Self::FailedExtraction
                | Self::FailedNoModel
                | Self::FailedGeneration
                | Self::FailedWriteback
        )
    }

    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.is_terminal() && !matches!(self, Self::Done)
    }

    /// Failure state for `error`.
    #[must_use]
    pub const fn failed_with(error: &PipelineError) -> Self {
        match error {
            PipelineError::ExtractionEmpty => Self::FailedExtraction,
            PipelineError::NoModelAvailable => Self::FailedNoModel,
            PipelineError::GenerationFailed(_) => Self::FailedGeneration,
            PipelineError::WritebackFailed(_) => Self::FailedWriteback,
        }
    }

    /// Stable label used in metrics and the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::ExtractingText => "extracting_text",
            Self::SelectingModel => "selecting_model",
            Self::Generating => "generating",
            Self::WritingBack => "writing_back",
            Self::Done => "done",
            Self::FailedExtraction => "failed_extraction",
            Self::FailedNoModel => "failed_no_model",
            Self::FailedGeneration => "failed_generation",
            Self::FailedWriteback => "failed_writeback",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().replace('_', " "))
    }
}

/// Why a trigger did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The document holds a live reservation.
    RecentlyProcessed,
    /// The operator chose to skip.
    OperatorDeclined,
}

/// A request to analyse one document.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub id: DocumentId,
    /// Overrides the configured preferred model.
    pub preferred_model: Option<String>,
    /// Triggered by the watcher rather than the operator.
    pub auto_triggered: bool,
    /// Aborts the run while it is generating.
    pub cancel: CancellationToken,
}

impl RunRequest {
    /// A run started by a new arrival.
    #[must_use]
    pub fn automatic(id: DocumentId) -> Self {
        Self {
            id,
            preferred_model: None,
            auto_triggered: true,
            cancel: CancellationToken::new(),
        }
    }

    /// A run the operator asked for.
    #[must_use]
    pub fn manual(id: DocumentId) -> Self {
        Self {
            auto_triggered: false,
            ..Self::automatic(id)
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Everything known about a run once it stops.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub id: DocumentId,
    pub auto_triggered: bool,
    pub state: RunState,
    /// Set when the trigger was refused; the state is then `Idle`.
    pub skipped: Option<SkipReason>,
    pub model: Option<Resolution>,
    pub coverage: Option<Coverage>,
    /// The generated text, kept even when write-back fails.
    pub analysis: Option<String>,
    pub tags: Vec<String>,
    /// Status message from write-back.
    pub status: Option<String>,
    pub failure: Option<PipelineError>,
    pub generated_chars: usize,
}

impl RunReport {
    fn new(request: &RunRequest) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            id: request.id.clone(),
            auto_triggered: request.auto_triggered,
            state: RunState::Idle,
            skipped: None,
            model: None,
            coverage: None,
            analysis: None,
            tags: Vec::new(),
            status: None,
            failure: None,
            generated_chars: 0,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub preferred_model: String,
    pub vendor_filter: Option<String>,
    /// Preferred instead of `preferred_model` when the extracted text is longer
    /// than `large_context_threshold_chars`.
    pub large_context_model: Option<String>,
    pub large_context_threshold_chars: usize,
    pub context_budget_chars: usize,
    /// Generation progress is reported each time output crosses a multiple of this.
    pub progress_every_chars: usize,
    pub dedup_window: Duration,
    /// Ask the operator before automatically triggered runs.
    pub confirm_auto_runs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            preferred_model: "gpt-4o".to_string(),
            vendor_filter: None,
            large_context_model: None,
            large_context_threshold_chars: 80_000,
            context_budget_chars: 60_000,
            progress_every_chars: 500,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            confirm_auto_runs: true,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            preferred_model: config.preferred_model.clone(),
            vendor_filter: config.vendor_filter.clone(),
            large_context_model: config.large_context_model.clone(),
            large_context_threshold_chars: config.large_context_threshold_chars,
            context_budget_chars: config.context_budget_chars,
            progress_every_chars: config.progress_every_chars,
            dedup_window: config.dedup_window(),
            confirm_auto_runs: config.confirm_auto_runs,
        }
    }
}

/// External collaborators a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn TextExtractor>,
    pub backend: Arc<dyn ModelBackend>,
    pub writer: Arc<dyn AnalysisWriter>,
    pub prompts: Arc<dyn PromptSource>,
    pub notifier: Arc<dyn Notifier>,
}

/// Drives analysis runs and owns de-duplication.
pub struct AnalysisOrchestrator {
    config: OrchestratorConfig,
    extractor: Arc<dyn TextExtractor>,
    backend: Arc<dyn ModelBackend>,
    writer: Arc<dyn AnalysisWriter>,
    prompts: Arc<dyn PromptSource>,
    notifier: Arc<dyn Notifier>,
    resolver: ModelResolver,
    recent: RecentlyProcessed,
    ledger: Option<Database>,
}

impl AnalysisOrchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        let resolver = ModelResolver::new(
            Arc::clone(&collaborators.backend),
            config.vendor_filter.clone(),
        );
        Self {
            recent: RecentlyProcessed::new(config.dedup_window),
            resolver,
            config,
            extractor: collaborators.extractor,
            backend: collaborators.backend,
            writer: collaborators.writer,
            prompts: collaborators.prompts,
            notifier: collaborators.notifier,
            ledger: None,
        }
    }

    /// Record finished runs in `ledger`.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Database) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub const fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn recently_processed(&self) -> &RecentlyProcessed {
        &self.recent
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the pipeline once for `request`.
    pub async fn run(&self, request: RunRequest) -> RunReport {
        let mut report = RunReport::new(&request);
        let span = spans::run_span(
            request.id.as_str(),
            &report.run_id.to_string(),
            request.auto_triggered,
        );

        async {
            if !self.recent.try_reserve(&request.id) {
                metrics::DUPLICATE_TRIGGERS.inc();
                tracing::info!("Document analysed recently, ignoring trigger");
                report.skipped = Some(SkipReason::RecentlyProcessed);
                return;
            }

            if request.auto_triggered
                && self.config.confirm_auto_runs
                && self.notifier.confirm_start(&request.id).await == Decision::Skip
            {
                self.recent.release(&request.id);
                report.skipped = Some(SkipReason::OperatorDeclined);
                return;
            }

            let started_at = chrono::Utc::now().timestamp();
            report.advance(RunState::Queued);
            self.notifier.notify(Notification::Started {
                id: request.id.clone(),
                auto_triggered: request.auto_triggered,
            });

            match self.drive(&request, &mut report).await {
                Ok(()) => {
                    report.advance(RunState::Done);
                    tracing::info!(chars = report.generated_chars, "Analysis complete");
                    self.notifier.notify(Notification::Succeeded {
                        report: report.clone(),
                    });
                }
                Err(error) => {
                    let stage = report.state;
                    report.advance(RunState::failed_with(&error));
                    tracing::warn!(%stage, %error, "Analysis run failed");
                    report.failure = Some(error);
                    self.recent.release(&request.id);
                    self.notifier.notify(Notification::Failed {
                        report: report.clone(),
                        stage,
                    });
                }
            }

            metrics::RUNS_TOTAL
                .with_label_values(&[report.state.as_str()])
                .inc();
            self.record(&report, started_at);
        }
        .instrument(span)
        .await;

        report
    }

    /// Per-run override, else the large-context model for long documents,
    /// else the configured preference.
    fn preferred_model_for<'a>(&'a self, request: &'a RunRequest, text: &str) -> &'a str {
        if let Some(model) = request.preferred_model.as_deref() {
            return model;
        }
        if let Some(large) = self.config.large_context_model.as_deref() {
            let chars = text.chars().count();
            if chars > self.config.large_context_threshold_chars
                && large != self.config.preferred_model
            {
                tracing::info!(
                    chars,
                    model = large,
                    "Long document, preferring large-context model"
                );
                return large;
            }
        }
        &self.config.preferred_model
    }

    async fn drive(
        &self,
        request: &RunRequest,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let id = &request.id;

        report.advance(RunState::ExtractingText);
        let text = match self
            .extractor
            .extract(id)
            .instrument(spans::collaborator_span("text-extraction"))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return Err(PipelineError::ExtractionEmpty),
            Err(e) => {
                tracing::warn!(error = %e, "Text extraction failed");
                return Err(PipelineError::ExtractionEmpty);
            }
        };

        report.advance(RunState::SelectingModel);
        let preferred = self.preferred_model_for(request, &text);
        let resolution = self
            .resolver
            .resolve(preferred)
            .await
            .ok_or(PipelineError::NoModelAvailable)?;
        self.progress(
            id,
            RunState::SelectingModel,
            format!("using {} ({} match)", resolution.model.family, resolution.tier),
        );
        let model = resolution.model.clone();
        report.model = Some(resolution);

        report.advance(RunState::Generating);
        let template = self.prompts.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Prompt template unavailable, using built-in");
            PromptTemplate::builtin()
        });
        let selection = select_context(&text, model.context_budget(self.config.context_budget_chars));
        if !selection.coverage.is_complete() {
            tracing::warn!(coverage = %selection.coverage, "Document exceeds context budget");
        }
        self.progress(id, RunState::Generating, format!("reading {}", selection.coverage));
        report.coverage = Some(selection.coverage);

        let messages = build_messages(&template, id, &selection);
        let analysis = self.generate(&model, &messages, request, report).await?;

        let tags = extract_tags(&analysis, &template.tags);
        let (body, _) = strip_tags_line(&analysis);
        let document = AnalysisDocument {
            id: id.clone(),
            model: model.family.clone(),
            coverage: selection.coverage,
            body: body.to_string(),
            tags: tags.clone(),
            analyzed_at: chrono::Utc::now(),
        };
        report.tags = tags;
        report.analysis = Some(analysis);

        report.advance(RunState::WritingBack);
        let status = self
            .writer
            .persist(&document)
            .instrument(spans::collaborator_span("write-back"))
            .await
            .map_err(|e| PipelineError::WritebackFailed(e.to_string()))?;
        report.status = Some(status);

        Ok(())
    }

    async fn generate(
        &self,
        model: &ModelInfo,
        messages: &[ChatMessage],
        request: &RunRequest,
        report: &mut RunReport,
    ) -> Result<String, PipelineError> {
        let cancel = &request.cancel;
        let cancelled = || PipelineError::GenerationFailed("cancelled".to_string());
        let failed = |e: crate::Error| PipelineError::GenerationFailed(e.to_string());

        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            started = self.backend.generate(model, messages, cancel.clone()) => started,
        };
        let mut stream = started.map_err(failed)?;

        let every = self.config.progress_every_chars.max(1);
        let mut next_report = every;
        let mut produced = 0usize;
        let mut output = String::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                chunk = stream.next() => chunk,
            };

            match chunk {
                None => break,
                Some(Err(e)) => return Err(failed(e)),
                Some(Ok(text)) => {
                    produced += text.chars().count();
                    output.push_str(&text);
                    if produced >= next_report {
                        self.progress(
                            &request.id,
                            RunState::Generating,
                            format!("{produced} characters"),
                        );
                        next_report = (produced / every + 1) * every;
                    }
                }
            }
        }

        if output.trim().is_empty() {
            return Err(PipelineError::GenerationFailed(
                "model returned an empty response".to_string(),
            ));
        }

        metrics::GENERATED_CHARS.inc_by(u64::try_from(produced).unwrap_or(u64::MAX));
        report.generated_chars = produced;
        Ok(output)
    }

    fn progress(&self, id: &DocumentId, stage: RunState, detail: String) {
        tracing::debug!(%stage, %detail, "Run progress");
        self.notifier.notify(Notification::Progress {
            id: id.clone(),
            stage,
            detail,
        });
    }

    fn record(&self, report: &RunReport, started_at: i64) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let record = RunRecord {
            id: report.run_id.to_string(),
            document_id: report.id.to_string(),
            model: report.model.as_ref().map(|r| r.model.family.clone()),
            state: report.state.as_str().to_string(),
            coverage: report.coverage.map(|c| c.to_string()),
            error: report.failure.as_ref().map(ToString::to_string),
            chars: i64::try_from(report.generated_chars).unwrap_or(i64::MAX),
            auto_triggered: report.auto_triggered,
            started_at,
            finished_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = ledger.with_conn(|conn| record_run(conn, &record)) {
            tracing::warn!(error = %e, "Failed to record run in ledger");
        }
    }

    /// Run every document that arrives on `ready_rx` as an automatic run.
    ///
    /// Returns once the channel is closed and all started runs have ended.
    /// Cancelling `shutdown` cancels runs that are still generating.
    pub async fn serve(
        self: Arc<Self>,
        mut ready_rx: mpsc::Receiver<DocumentReady>,
        shutdown: CancellationToken,
    ) {
        let mut runs = JoinSet::new();
        tracing::info!("Analysis pipeline started");

        loop {
            tokio::select! {
                Some(ready) = ready_rx.recv() => {
                    let this = Arc::clone(&self);
                    let request = RunRequest::automatic(ready.id).with_cancel(shutdown.child_token());
                    runs.spawn(async move { this.run(request).await });
                }
                Some(joined) = runs.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Analysis task aborted");
                    }
                }
                else => break,
            }
        }

        tracing::info!("Analysis pipeline stopped");
    }
}
