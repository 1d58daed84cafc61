//! Storage folder watching.
//!
//! This module provides:
//! - Directory watching using notify-rs
//! - Document filtering by extension
//! - Identifier extraction from attachment paths
//! - Per-path debouncing of event bursts

mod debouncer;
mod events;
mod filter;
mod identifier;
#[allow(clippy::module_inception)]
mod watcher;

pub use debouncer::{
    DebounceConfig, Debouncer, DocumentReady, DEFAULT_QUIET_PERIOD, DEFAULT_SETTLE_PERIOD,
};
pub use events::FileEvent;
pub use filter::DocumentFilter;
pub use identifier::{extract_identifier, DocumentId, IDENTIFIER_LEN};
pub use watcher::FileWatcher;
