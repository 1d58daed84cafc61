//! Configuration management for paperwatch.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - TOML configuration file (lowest priority)

mod settings;

pub use settings::Config;
