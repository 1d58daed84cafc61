//! Document filtering for watched storage folders.

use std::path::Path;

/// Suffixes browsers and sync tools use for files still being written.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".crdownload", ".download", ".tmp", ".partial"];

/// Decides which paths are documents worth analysing.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    extensions: Vec<String>,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::new(["pdf"])
    }
}

impl DocumentFilter {
    /// Create a filter accepting the given extensions (case-insensitive, no dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Check if a path names a document, judging by name only.
    ///
    /// The file is not required to exist: the debouncer checks that later,
    /// after the write has settled.
    #[must_use]
    pub fn is_document(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if Self::is_transient_name(name) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }

    /// Hidden files, office lock files and in-flight downloads.
    fn is_transient_name(name: &str) -> bool {
        if name.starts_with('.') || name.starts_with("~$") {
            return true;
        }
        let lower = name.to_lowercase();
        PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_document_default_pdf() {
        let filter = DocumentFilter::default();
        assert!(filter.is_document(Path::new("/s/ABCD1234/paper.pdf")));
        assert!(filter.is_document(Path::new("/s/ABCD1234/PAPER.PDF")));
        assert!(!filter.is_document(Path::new("/s/ABCD1234/notes.md")));
        assert!(!filter.is_document(Path::new("/s/ABCD1234")));
    }

    #[test]
    fn test_transient_files_ignored() {
        let filter = DocumentFilter::default();
        assert!(!filter.is_document(Path::new("/s/ABCD1234/.paper.pdf")));
        assert!(!filter.is_document(Path::new("/s/ABCD1234/~$paper.pdf")));
        assert!(!filter.is_document(Path::new("/s/ABCD1234/paper.pdf.part")));
        assert!(!filter.is_document(Path::new("/s/ABCD1234/paper.pdf.crdownload")));
    }

    #[test]
    fn test_custom_extensions() {
        let filter = DocumentFilter::new([".EPUB", "pdf"]);
        assert!(filter.is_document(Path::new("/s/book.epub")));
        assert!(filter.is_document(Path::new("/s/paper.pdf")));
        assert!(!filter.is_document(Path::new("/s/paper.djvu")));
    }

    #[test]
    fn test_nonexistent_paths_still_match() {
        let filter = DocumentFilter::default();
        assert!(filter.is_document(Path::new("/definitely/not/here/paper.pdf")));
    }
}
