//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels
//! - Spans for analysis runs and collaborator calls

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span helpers.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering one analysis run.
    #[must_use]
    pub fn run_span(document: &str, run_id: &str, auto_triggered: bool) -> Span {
        info_span!(
            "analysis_run",
            document = %document,
            run_id = %run_id,
            auto = auto_triggered,
        )
    }

    /// Span covering one call into an external collaborator.
    #[must_use]
    pub fn collaborator_span(name: &str) -> Span {
        info_span!("collaborator", name = %name)
    }
}
