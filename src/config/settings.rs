//! Configuration settings and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Main configuration for paperwatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attachment storage root of the reference manager; one directory per item key.
    pub storage_root: PathBuf,

    /// Directory analysis notes are written to.
    pub notes_dir: PathBuf,

    /// Directory for the run ledger database.
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Model the operator would like to use; resolved against what the backend offers.
    pub preferred_model: String,

    /// Restrict model discovery to one vendor/publisher.
    pub vendor_filter: Option<String>,

    /// Model preferred for documents longer than `large_context_threshold_chars`.
    pub large_context_model: Option<String>,

    /// Extracted text length, in characters, above which `large_context_model` is preferred.
    pub large_context_threshold_chars: usize,

    /// Base URL of the OpenAI-compatible backend.
    pub endpoint: String,

    /// Bearer token for the backend.
    pub api_token: Option<String>,

    /// Maximum number of document characters sent to the model.
    pub context_budget_chars: usize,

    /// Emit a progress update after this many generated characters.
    pub progress_every_chars: usize,

    /// Sampling temperature.
    pub temperature: f32,

    /// Completion token limit.
    pub max_output_tokens: u32,

    /// Quiet period before a burst of file events fires.
    pub quiet_period_ms: u64,

    /// Extra settle time before a fired event starts a run.
    pub settle_period_ms: u64,

    /// How long a started document stays reserved against duplicate runs.
    pub dedup_window_secs: u64,

    /// File extensions treated as documents.
    pub document_extensions: Vec<String>,

    /// Skill prompt file (markdown, optional front matter).
    pub prompt_path: Option<PathBuf>,

    /// Text extraction command, invoked as `<cmd> -layout <pdf> -`.
    pub pdftotext_command: String,

    /// Ask the operator before automatically triggered runs.
    pub confirm_auto_runs: bool,

    /// Overall timeout when waiting for a PDF to appear.
    pub pdf_wait_timeout_secs: u64,

    /// Poll interval when waiting for a PDF to appear.
    pub pdf_wait_interval_secs: u64,

    /// Pause between documents in batch mode.
    pub batch_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./Zotero/storage"),
            notes_dir: PathBuf::from("./notes"),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            preferred_model: "gpt-4o".to_string(),
            vendor_filter: None,
            large_context_model: None,
            large_context_threshold_chars: 80_000,
            endpoint: "https://models.inference.ai.azure.com".to_string(),
            api_token: None,
            context_budget_chars: 60_000,
            progress_every_chars: 500,
            temperature: 0.3,
            max_output_tokens: 4096,
            quiet_period_ms: 3_000,
            settle_period_ms: 5_000,
            dedup_window_secs: 120,
            document_extensions: vec!["pdf".to_string()],
            prompt_path: None,
            pdftotext_command: "pdftotext".to_string(),
            confirm_auto_runs: true,
            pdf_wait_timeout_secs: 300,
            pdf_wait_interval_secs: 15,
            batch_delay_secs: 3,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, falling back to defaults for missing keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.context_budget_chars == 0 {
            return Err(Error::config("context_budget_chars cannot be 0"));
        }

        if self.progress_every_chars == 0 {
            return Err(Error::config("progress_every_chars cannot be 0"));
        }

        if self.quiet_period_ms == 0 {
            return Err(Error::config("quiet_period_ms cannot be 0"));
        }

        if self.dedup_window_secs == 0 {
            return Err(Error::config("dedup_window_secs cannot be 0"));
        }

        if self.pdf_wait_interval_secs == 0 {
            return Err(Error::config("pdf_wait_interval_secs cannot be 0"));
        }

        if self.endpoint.trim().is_empty() {
            return Err(Error::config("endpoint cannot be empty"));
        }

        if self.preferred_model.trim().is_empty() {
            return Err(Error::config("preferred_model cannot be empty"));
        }

        if self.document_extensions.is_empty() {
            return Err(Error::config("document_extensions cannot be empty"));
        }

        if self
            .large_context_model
            .as_deref()
            .is_some_and(|model| model.trim().is_empty())
        {
            return Err(Error::config("large_context_model cannot be empty when set"));
        }

        Ok(())
    }

    /// Get the path to the run ledger database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("paperwatch.db")
    }

    /// Quiet period as a duration.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Settle period as a duration.
    #[must_use]
    pub const fn settle_period(&self) -> Duration {
        Duration::from_millis(self.settle_period_ms)
    }

    /// De-duplication window as a duration.
    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    /// PDF wait timeout as a duration.
    #[must_use]
    pub const fn pdf_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_wait_timeout_secs)
    }

    /// PDF wait poll interval as a duration.
    #[must_use]
    pub const fn pdf_wait_interval(&self) -> Duration {
        Duration::from_secs(self.pdf_wait_interval_secs)
    }

    /// Batch delay as a duration.
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.context_budget_chars, 60_000);
        assert_eq!(config.quiet_period(), Duration::from_secs(3));
        assert_eq!(config.settle_period(), Duration::from_secs(5));
        assert_eq!(config.dedup_window(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml(
            r#"
            storage_root = "/home/me/Zotero/storage"
            preferred_model = "claude-sonnet-4-6"
            context_budget_chars = 90000
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_root, PathBuf::from("/home/me/Zotero/storage"));
        assert_eq!(config.preferred_model, "claude-sonnet-4-6");
        assert_eq!(config.context_budget_chars, 90_000);
        // Untouched keys keep their defaults
        assert_eq!(config.progress_every_chars, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = Config::from_toml("context_budget_chars = \"lots\"").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn test_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("paperwatch.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_zero_budget() {
        let config = Config {
            context_budget_chars: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("context_budget_chars"));
    }

    #[test]
    fn test_validate_zero_quiet_period() {
        let config = Config {
            quiet_period_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quiet_period_ms"));
    }

    #[test]
    fn test_validate_empty_endpoint() {
        let config = Config {
            endpoint: "  ".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_large_context_model_from_toml() {
        let config = Config::from_toml(
            r#"
            large_context_model = "gpt-4.1"
            large_context_threshold_chars = 50000
            "#,
        )
        .unwrap();

        assert_eq!(config.large_context_model.as_deref(), Some("gpt-4.1"));
        assert_eq!(config.large_context_threshold_chars, 50_000);
        assert!(config.validate().is_ok());

        let blank = Config {
            large_context_model: Some("  ".to_string()),
            ..Default::default()
        };
        let err = blank.validate().unwrap_err();
        assert!(err.to_string().contains("large_context_model"));
    }

    #[test]
    fn test_validate_no_extensions() {
        let config = Config {
            document_extensions: Vec::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("document_extensions"));
    }

    #[test]
    fn test_database_path() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/paperwatch"),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/paperwatch/paperwatch.db")
        );
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }
}
