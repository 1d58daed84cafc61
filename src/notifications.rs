//! Operator-facing notifications and the proceed/skip decision.

use std::io::IsTerminal;

use async_trait::async_trait;
use dialoguer::Confirm;
use parking_lot::Mutex;

use crate::analysis::{RunReport, RunState};
use crate::watcher::DocumentId;

/// Operator answer to "analyze this document now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Skip,
}

/// One message to the operator.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A run was accepted.
    Started { id: DocumentId, auto_triggered: bool },
    /// A run moved forward.
    Progress {
        id: DocumentId,
        stage: RunState,
        detail: String,
    },
    /// A run finished and its analysis was saved.
    Succeeded { report: RunReport },
    /// A run ended in a failure state; `stage` is where it stopped.
    Failed { report: RunReport, stage: RunState },
}

/// Operator surface used by the orchestrator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask whether an automatically triggered run should go ahead.
    async fn confirm_start(&self, id: &DocumentId) -> Decision;

    /// Deliver a notification.
    fn notify(&self, notification: Notification);
}

/// Terminal notifier: `dialoguer` prompt plus plain output.
pub struct ConsoleNotifier {
    interactive: bool,
    prompt_lock: tokio::sync::Mutex<()>,
}

impl ConsoleNotifier {
    /// With `interactive` off, every confirmation proceeds without asking.
    #[must_use]
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive,
            prompt_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Interactive when stdin is a terminal and `confirm` is set.
    #[must_use]
    pub fn detect(confirm: bool) -> Self {
        Self::new(confirm && std::io::stdin().is_terminal())
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn confirm_start(&self, id: &DocumentId) -> Decision {
        if !self.interactive {
            return Decision::Proceed;
        }

        // One prompt on the terminal at a time.
        let _guard = self.prompt_lock.lock().await;
        let prompt = format!("New document {id} detected. Analyze it now?");
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(true).interact()
        })
        .await;

        match answer {
            Ok(Ok(true)) => Decision::Proceed,
            Ok(Ok(false)) => {
                tracing::info!(%id, "Operator skipped analysis");
                Decision::Skip
            }
            Ok(Err(e)) => {
                tracing::warn!(%id, error = %e, "Confirmation prompt failed, proceeding");
                Decision::Proceed
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "Confirmation task failed, proceeding");
                Decision::Proceed
            }
        }
    }

    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Started { id, auto_triggered } => {
                let origin = if auto_triggered { "new arrival" } else { "requested" };
                println!("> Analyzing {id} ({origin})");
            }
            Notification::Progress { id, stage, detail } => {
                println!("  {id} | {stage} | {detail}");
            }
            Notification::Succeeded { report } => {
                let model = report
                    .model
                    .as_ref()
                    .map_or("unknown model", |r| r.model.family.as_str());
                println!("+ {} analyzed with {model}", report.id);
                if let Some(coverage) = report.coverage {
                    println!("  coverage: {coverage}");
                }
                if let Some(status) = &report.status {
                    println!("  {status}");
                }
                println!(
                    "  follow up: paperwatch analyze {} --model <name> to compare with another model",
                    report.id
                );
            }
            Notification::Failed { report, stage } => {
                let reason = report
                    .failure
                    .as_ref()
                    .map_or_else(|| "unknown error".to_string(), ToString::to_string);
                eprintln!("x {} failed while {stage}: {reason}", report.id);

                if report.failure.as_ref().is_some_and(|f| f.analysis_survived()) {
                    if let Some(analysis) = &report.analysis {
                        eprintln!("--- unsaved analysis for {} ---", report.id);
                        println!("{analysis}");
                        eprintln!("--- end of analysis ---");
                    }
                }
            }
        }
    }
}

/// Notifier that answers from a script and keeps everything it is told.
///
/// Useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    decisions: Mutex<Vec<Decision>>,
    confirmations: Mutex<Vec<DocumentId>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next confirmations with `decisions`, in order; then proceed.
    #[must_use]
    pub fn with_decisions(decisions: impl IntoIterator<Item = Decision>) -> Self {
        let mut decisions: Vec<Decision> = decisions.into_iter().collect();
        decisions.reverse();
        Self {
            decisions: Mutex::new(decisions),
            ..Self::default()
        }
    }

    /// Identifiers the operator was asked about.
    #[must_use]
    pub fn confirmations(&self) -> Vec<DocumentId> {
        self.confirmations.lock().clone()
    }

    /// Everything notified so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Progress notifications for `stage`.
    #[must_use]
    pub fn progress_for(&self, stage: RunState) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Progress {
                    stage: s, detail, ..
                } if *s == stage => Some(detail.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn confirm_start(&self, id: &DocumentId) -> Decision {
        self.confirmations.lock().push(id.clone());
        self.decisions.lock().pop().unwrap_or(Decision::Proceed)
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}
