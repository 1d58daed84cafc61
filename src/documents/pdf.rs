//! Text extraction through the `pdftotext` tool.

use async_trait::async_trait;
use tokio::process::Command;

use super::{DocumentLocator, TextExtractor};
use crate::watcher::DocumentId;
use crate::{Error, Result};

/// Runs `pdftotext -layout <pdf> -` on the document's first PDF.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    locator: DocumentLocator,
    command: String,
}

impl PdfTextExtractor {
    pub fn new(locator: DocumentLocator, command: impl Into<String>) -> Self {
        Self {
            locator,
            command: command.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, id: &DocumentId) -> Result<String> {
        let pdf = self.locator.find(id).ok_or_else(|| {
            Error::collaborator(
                "text extraction",
                format!(
                    "no PDF under {}",
                    self.locator.storage_root().join(id.as_str()).display()
                ),
            )
        })?;

        tracing::debug!(%id, pdf = %pdf.display(), command = %self.command, "Extracting text");

        let output = Command::new(&self.command)
            .arg("-layout")
            .arg(&pdf)
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::collaborator("text extraction", format!("{}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::collaborator(
                "text extraction",
                format!("{} exited with {}: {}", self.command, output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::info!(%id, chars = text.chars().count(), "Extracted document text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_pdf_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let extractor = PdfTextExtractor::new(DocumentLocator::new(tmp.path()), "pdftotext");

        let err = extractor
            .extract(&"ABCD1234".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("text extraction failed: no PDF under"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ABCD1234");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("paper.pdf"), b"%PDF-1.7").unwrap();

        let extractor = PdfTextExtractor::new(
            DocumentLocator::new(tmp.path()),
            "paperwatch-no-such-pdftotext",
        );
        let err = extractor
            .extract(&"ABCD1234".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("paperwatch-no-such-pdftotext"));
    }
}
