//! Locating stored documents and turning them into text.

mod pdf;
mod wait;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::watcher::{DocumentFilter, DocumentId};
use crate::Result;

pub use pdf::PdfTextExtractor;
pub use wait::{wait_for_document, WaitOutcome};

/// Produces the plain text of a document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text of document `id`. Blank output is not an error here.
    async fn extract(&self, id: &DocumentId) -> Result<String>;
}

/// Finds documents inside the `<root>/<ID>/` storage layout.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    storage_root: PathBuf,
    filter: DocumentFilter,
}

impl DocumentLocator {
    /// Locate PDFs under `storage_root`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            filter: DocumentFilter::default(),
        }
    }

    /// Accept the same documents the watcher reacts to.
    #[must_use]
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// First document (by file name) in the identifier's folder.
    #[must_use]
    pub fn find(&self, id: &DocumentId) -> Option<PathBuf> {
        let candidates = [
            self.storage_root.join(id.as_str()),
            self.storage_root.join(id.as_str().to_lowercase()),
        ];

        candidates.iter().find_map(|dir| {
            let mut docs: Vec<PathBuf> = std::fs::read_dir(dir)
                .ok()?
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && self.filter.is_document(path))
                .collect();
            docs.sort();
            docs.into_iter().next()
        })
    }

    /// Identifiers of every folder directly under the storage root, sorted.
    #[must_use]
    pub fn list_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = WalkDir::new(&self.storage_root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| DocumentId::parse(&entry.file_name().to_string_lossy()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
