//! File system event types and handling.

#![allow(clippy::missing_const_for_fn)]

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// File system events the pipeline reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created.
    Created(PathBuf),
    /// File was renamed from old path to new path.
    Renamed { from: Option<PathBuf>, to: PathBuf },
}

impl FileEvent {
    /// Get the path the document now lives at.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Created(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }

    /// Translate a raw notify event.
    ///
    /// Only creations and renames are kept; content modifications, removals
    /// and metadata changes yield nothing.
    #[must_use]
    pub fn from_notify(event: &Event) -> Vec<Self> {
        match event.kind {
            EventKind::Create(_) => event.paths.iter().cloned().map(Self::Created).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
                (RenameMode::Both, [from, to]) => vec![Self::Renamed {
                    from: Some(from.clone()),
                    to: to.clone(),
                }],
                (RenameMode::From, _) => Vec::new(),
                (_, paths) => paths
                    .iter()
                    .map(|to| Self::Renamed {
                        from: None,
                        to: to.clone(),
                    })
                    .collect(),
            },
            _ => Vec::new(),
        }
    }
}
