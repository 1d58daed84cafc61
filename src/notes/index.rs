//! The `INDEX.md` table of analysed documents.

use std::path::Path;

use super::AnalysisDocument;
use crate::{Error, Result};

/// File name of the index, inside the notes directory.
pub const INDEX_FILE: &str = "INDEX.md";

const HEADER: &str = "# Paper analyses\n\n| Date | Document | Tags | Model |\n|------|----------|------|-------|\n";

/// One table row linking to the note at `relative`.
#[must_use]
pub fn index_row(document: &AnalysisDocument, relative: &Path) -> String {
    let link = relative.to_string_lossy().replace('\\', "/");
    let tags = if document.tags.is_empty() {
        "-".to_string()
    } else {
        document.tags.join(", ")
    };
    format!(
        "| {} | [{}]({link}) | {tags} | {} |",
        document.analyzed_at.format("%Y-%m-%d"),
        document.id,
        document.model
    )
}

/// Append a row for `document` unless the index already lists it.
pub(super) async fn append_to_index(
    notes_dir: &Path,
    document: &AnalysisDocument,
    relative: &Path,
) -> Result<()> {
    let path = notes_dir.join(INDEX_FILE);
    let failed = |e: std::io::Error| Error::collaborator("write-back", format!("{}: {e}", path.display()));

    let mut contents = match tokio::fs::read_to_string(&path).await {
        Ok(existing) => existing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HEADER.to_string(),
        Err(e) => return Err(failed(e)),
    };

    let marker = format!("[{}](", document.id);
    if contents.contains(&marker) {
        tracing::debug!(id = %document.id, "Index already lists document");
        return Ok(());
    }

    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&index_row(document, relative));
    contents.push('\n');

    tokio::fs::write(&path, contents).await.map_err(failed)?;
    tracing::debug!(id = %document.id, "Index updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Coverage;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn document(id: &str, tags: &[&str]) -> AnalysisDocument {
        AnalysisDocument {
            id: id.parse().unwrap(),
            model: "gpt-4o".into(),
            coverage: Coverage::Complete { total_chars: 10 },
            body: String::new(),
            tags: tags.iter().map(ToString::to_string).collect(),
            analyzed_at: Utc.with_ymd_and_hms(2026, 10, 2, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_index_row() {
        let row = index_row(
            &document("ABCD1234", &["ecology", "soil"]),
            Path::new("2026/ABCD1234.md"),
        );
        insta::assert_snapshot!(row, @"| 2026-10-02 | [ABCD1234](2026/ABCD1234.md) | ecology, soil | gpt-4o |");
    }

    #[test]
    fn test_index_row_without_tags() {
        let row = index_row(&document("ABCD1234", &[]), Path::new("2026/ABCD1234.md"));
        assert!(row.contains("| - |"));
    }

    #[tokio::test]
    async fn test_rows_added_once_per_document() {
        let tmp = TempDir::new().unwrap();
        let first = document("ABCD1234", &["a"]);
        let second = document("WXYZ9876", &["b"]);

        append_to_index(tmp.path(), &first, Path::new("2026/ABCD1234.md")).await.unwrap();
        append_to_index(tmp.path(), &first, Path::new("2026/ABCD1234.md")).await.unwrap();
        append_to_index(tmp.path(), &second, Path::new("2026/WXYZ9876.md")).await.unwrap();

        let index = std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();
        assert!(index.starts_with("# Paper analyses\n"));
        assert_eq!(index.matches("[ABCD1234](").count(), 1);
        assert_eq!(index.matches("[WXYZ9876](").count(), 1);
        assert_eq!(index.lines().count(), 6);
    }
}
