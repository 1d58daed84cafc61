//! Paperwatch - LLM analyses for newly attached papers
//!
//! Entry point for the paperwatch command line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use paperwatch::app::{AnalyzeOutcome, App};
use paperwatch::metrics::{init_metrics, render};
use paperwatch::observability::init_tracing;
use paperwatch::watcher::DocumentId;
use paperwatch::Config;

/// Paperwatch - LLM analyses for newly attached papers
#[derive(Parser, Debug)]
#[command(name = "paperwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PAPERWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Reference-manager storage folder to watch
    #[arg(long, env = "PAPERWATCH_STORAGE_ROOT", global = true)]
    storage_root: Option<PathBuf>,

    /// Directory for analysis notes
    #[arg(long, env = "PAPERWATCH_NOTES_DIR", global = true)]
    notes_dir: Option<PathBuf>,

    /// Data directory for the `SQLite` run ledger
    #[arg(long, env = "PAPERWATCH_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Preferred model name
    #[arg(long, env = "PAPERWATCH_MODEL", global = true)]
    model: Option<String>,

    /// Model endpoint (OpenAI-compatible)
    #[arg(long, env = "PAPERWATCH_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token for the model endpoint
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PAPERWATCH_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "PAPERWATCH_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the storage folder and analyse new arrivals (default)
    Watch {
        /// Start runs without asking
        #[arg(long)]
        no_confirm: bool,
    },
    /// Analyse one document by its storage key
    Analyze {
        /// Eight-character storage key
        key: String,
        /// Poll until the PDF appears
        #[arg(long)]
        wait: bool,
        /// Model for this run only, overriding the preferred model
        #[arg(long, value_name = "MODEL")]
        with_model: Option<String>,
    },
    /// Analyse every stored document not yet analysed
    Batch {
        /// Stop after this many runs
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List advertised models and the resolved preference
    Models,
    /// Show recent runs from the ledger
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(root) = &self.storage_root {
            config.storage_root.clone_from(root);
        }
        if let Some(dir) = &self.notes_dir {
            config.notes_dir.clone_from(dir);
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(model) = &self.model {
            config.preferred_model.clone_from(model);
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if self.token.is_some() {
            config.api_token.clone_from(&self.token);
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(Command::Watch { no_confirm: true }) = self.command {
            config.confirm_auto_runs = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(&config.log_level, cli.log_json);
    init_metrics();

    tracing::info!("Paperwatch v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let app = App::new(config)?;

    let command = cli.command.unwrap_or(Command::Watch { no_confirm: false });
    let outcome = run(&app, command).await;

    tracing::debug!(metrics = %render(), "Final metrics");
    outcome
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Watch { .. } => app.watch().await?,
        Command::Analyze {
            key,
            wait,
            with_model,
        } => {
            let id = DocumentId::parse(&key)
                .with_context(|| format!("{key:?} is not an eight-character storage key"))?;
            match app.analyze(id, with_model, wait).await {
                AnalyzeOutcome::DocumentNotReady => {
                    anyhow::bail!("no PDF for {key} appeared before the wait timed out");
                }
                AnalyzeOutcome::Ran(report) => {
                    if let Some(reason) = report.skipped {
                        println!("{key}: skipped ({reason:?})");
                    } else if report.succeeded() {
                        println!(
                            "{key}: {}",
                            report.status.as_deref().unwrap_or("analysis complete")
                        );
                    } else {
                        let reason = report
                            .failure
                            .as_ref()
                            .map_or_else(|| report.state.to_string(), ToString::to_string);
                        anyhow::bail!("{key}: {reason}");
                    }
                }
            }
        }
        Command::Batch { limit } => {
            let summary = app.batch(limit).await?;
            println!(
                "{} succeeded, {} failed, {} skipped, {} already analysed",
                summary.succeeded, summary.failed, summary.skipped, summary.already_done
            );
        }
        Command::Models => {
            let (models, resolution) = app.models().await;
            if models.is_empty() {
                anyhow::bail!("the endpoint advertised no models");
            }
            for model in &models {
                let marker = match &resolution {
                    Some(r) if r.model.id == model.id => "*",
                    _ => " ",
                };
                println!("{marker} {:<40} {}", model.family, model.vendor);
            }
            if let Some(resolution) = resolution {
                println!(
                    "\n{:?} resolves to {} ({})",
                    app.config().preferred_model,
                    resolution.model.name,
                    resolution.tier
                );
            }
        }
        Command::History { limit } => {
            for run in app.history(limit)? {
                println!(
                    "{}  {}  {:<22} {:<24} {}",
                    run.finished_at,
                    run.document_id,
                    run.state,
                    run.model.as_deref().unwrap_or("-"),
                    run.error.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}
