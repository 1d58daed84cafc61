//! Paperwatch Library
//!
//! Watches a reference-manager storage folder for newly attached papers,
//! streams a language-model analysis of each one and files the result as a
//! Markdown note.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod app;
pub mod config;
pub mod documents;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notes;
pub mod notifications;
pub mod observability;
pub mod storage;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
