//! Persisting finished analyses.

mod index;
mod markdown;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::Coverage;
use crate::watcher::DocumentId;
use crate::Result;

pub use index::{index_row, INDEX_FILE};
pub use markdown::{render_note, MarkdownNotesWriter};

/// A finished analysis ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisDocument {
    pub id: DocumentId,
    /// Family tag of the model that wrote it.
    pub model: String,
    pub coverage: Coverage,
    /// Analysis text with the tags line removed.
    pub body: String,
    pub tags: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Destination for finished analyses.
#[async_trait]
pub trait AnalysisWriter: Send + Sync {
    /// Persist `document`, returning a short status message for the operator.
    async fn persist(&self, document: &AnalysisDocument) -> Result<String>;
}
