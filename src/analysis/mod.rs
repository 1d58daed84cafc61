//! Document analysis pipeline.
//!
//! This module provides:
//! - Head/tail context selection within a character budget
//! - Prompt templates and tag extraction
//! - Time-bounded de-duplication of runs
//! - The orchestrator that drives each run to a terminal state

mod context;
mod orchestrator;
mod prompt;
mod recent;

pub use context::{select_context, ContextSelection, Coverage, ELISION_MARKER, HEAD_FRACTION};
pub use orchestrator::{
    AnalysisOrchestrator, Collaborators, OrchestratorConfig, RunReport, RunRequest, RunState,
    SkipReason,
};
pub use prompt::{
    build_messages, extract_tags, strip_tags_line, BuiltinPrompt, FilePromptSource, PromptSource,
    PromptTemplate, MAX_FALLBACK_TAGS,
};
pub use recent::{RecentlyProcessed, DEFAULT_DEDUP_WINDOW};
