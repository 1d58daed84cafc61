//! Markdown note files, one per document, grouped by year.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;

use super::index::append_to_index;
use super::{AnalysisDocument, AnalysisWriter};
use crate::analysis::Coverage;
use crate::{Error, Result};

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\s*```[\w-]*[ \t]*\r?\n").expect("valid regex"));
static FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n```\s*\z").expect("valid regex"));

/// Writes `<notes_dir>/<year>/<ID>.md` and keeps `INDEX.md` up to date.
#[derive(Debug, Clone)]
pub struct MarkdownNotesWriter {
    notes_dir: PathBuf,
    // Serializes the read-modify-write of INDEX.md across concurrent runs.
    index_lock: Arc<Mutex<()>>,
}

impl MarkdownNotesWriter {
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the note for `document`, relative to the notes directory.
    #[must_use]
    pub fn relative_path(document: &AnalysisDocument) -> PathBuf {
        Path::new(&document.analyzed_at.year().to_string()).join(format!("{}.md", document.id))
    }
}

#[async_trait]
impl AnalysisWriter for MarkdownNotesWriter {
    async fn persist(&self, document: &AnalysisDocument) -> Result<String> {
        let relative = Self::relative_path(document);
        let path = self.notes_dir.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::collaborator("write-back", format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, render_note(document))
            .await
            .map_err(|e| Error::collaborator("write-back", format!("{}: {e}", path.display())))?;
        tracing::info!(id = %document.id, path = %path.display(), "Note written");

        {
            let _guard = self.index_lock.lock().await;
            append_to_index(&self.notes_dir, document, &relative).await?;
        }

        Ok(format!("note saved to {}", path.display()))
    }
}

fn read_status(coverage: &Coverage) -> String {
    match coverage {
        Coverage::Complete { total_chars } => {
            format!("Read status: full text ({total_chars} characters)")
        }
        Coverage::Partial {
            head_chars,
            tail_chars,
            total_chars,
            percent,
        } => format!(
            "Read status: partial, {percent}% of {total_chars} characters \
             (first {head_chars} and last {tail_chars}; the middle was not read)"
        ),
    }
}

fn strip_code_fence(body: &str) -> &str {
    let start = FENCE_OPEN.find(body).map_or(0, |m| m.end());
    let rest = &body[start..];
    if start == 0 {
        return body.trim();
    }
    let end = FENCE_CLOSE.find(rest).map_or(rest.len(), |m| m.start());
    rest[..end].trim()
}

/// Render the full note: front matter, read-status banner, body.
#[must_use]
pub fn render_note(document: &AnalysisDocument) -> String {
    let tags = serde_json::to_string(&document.tags).unwrap_or_else(|_| "[]".to_string());

    let mut note = String::new();
    let _ = writeln!(note, "---");
    let _ = writeln!(note, "document_key: {}", document.id);
    let _ = writeln!(note, "model: {}", document.model);
    let _ = writeln!(note, "coverage: {}", document.coverage.percent());
    let _ = writeln!(note, "tags: {tags}");
    let _ = writeln!(note, "analyzed_at: {}", document.analyzed_at.to_rfc3339());
    let _ = writeln!(note, "---");
    let _ = writeln!(note);
    let _ = writeln!(note, "> Analysis by {}", document.model);
    let _ = writeln!(note, ">");
    let _ = writeln!(note, "> {}", read_status(&document.coverage));
    let _ = writeln!(note);
    let _ = writeln!(note, "{}", strip_code_fence(&document.body));
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use tempfile::TempDir;

    fn document(coverage: Coverage) -> AnalysisDocument {
        AnalysisDocument {
            id: "ABCD1234".parse().unwrap(),
            model: "claude-sonnet-4.6".into(),
            coverage,
            body: "## Summary\nA short paper.".into(),
            tags: vec!["genomics".into(), "CRISPR".into()],
            analyzed_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_complete_note() {
        let note = render_note(&document(Coverage::Complete { total_chars: 48_271 }));

        insta::assert_snapshot!(note, @r###"
        ---
        document_key: ABCD1234
        model: claude-sonnet-4.6
        coverage: 100
        tags: ["genomics","CRISPR"]
        analyzed_at: 2026-03-14T09:30:00+00:00
        ---

        > Analysis by claude-sonnet-4.6
        >
        > Read status: full text (48271 characters)

        ## Summary
        A short paper.
        "###);
    }

    #[test]
    fn test_render_partial_banner() {
        let note = render_note(&document(Coverage::Partial {
            head_chars: 40_153,
            tail_chars: 19_777,
            total_chars: 150_000,
            percent: 40,
        }));

        assert!(note.contains("coverage: 40\n"));
        assert!(note.contains(
            "> Read status: partial, 40% of 150000 characters (first 40153 and last 19777; the middle was not read)"
        ));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```markdown\n## A\ntext\n```\n"), "## A\ntext");
        assert_eq!(strip_code_fence("## A\n```rust\nfn x() {}\n```"), "## A\n```rust\nfn x() {}\n```");
    }

    #[tokio::test]
    async fn test_persist_writes_note_and_index() {
        let tmp = TempDir::new().unwrap();
        let writer = MarkdownNotesWriter::new(tmp.path());
        let doc = document(Coverage::Complete { total_chars: 100 });

        let status = writer.persist(&doc).await.unwrap();

        let note_path = tmp.path().join("2026").join("ABCD1234.md");
        assert!(status.contains("ABCD1234.md"));
        assert!(std::fs::read_to_string(&note_path).unwrap().contains("A short paper."));

        let index = std::fs::read_to_string(tmp.path().join("INDEX.md")).unwrap();
        assert!(index.contains("[ABCD1234](2026/ABCD1234.md)"));
    }

    #[tokio::test]
    async fn test_concurrent_persists_keep_every_index_row() {
        for _ in 0..20 {
            let tmp = TempDir::new().unwrap();
            let writer = MarkdownNotesWriter::new(tmp.path());
            let mut first = document(Coverage::Complete { total_chars: 100 });
            first.id = "AAAA1111".parse().unwrap();
            let mut second = first.clone();
            second.id = "BBBB2222".parse().unwrap();

            let (a, b) = tokio::join!(writer.persist(&first), writer.persist(&second));
            a.unwrap();
            b.unwrap();

            let index = std::fs::read_to_string(tmp.path().join("INDEX.md")).unwrap();
            assert_eq!(index.matches("[AAAA1111](").count(), 1);
            assert_eq!(index.matches("[BBBB2222](").count(), 1);
        }
    }

    #[tokio::test]
    async fn test_persist_fails_when_notes_dir_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("notes");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let writer = MarkdownNotesWriter::new(&blocker);
        let err = writer
            .persist(&document(Coverage::Complete { total_chars: 1 }))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("write-back failed"));
    }
}
