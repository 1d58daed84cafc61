//! Document identifiers derived from attachment paths.
//!
//! Reference managers store each attachment under `<storage>/<KEY>/file.pdf`
//! where `KEY` is an 8-character alphanumeric item key.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of a document identifier.
pub const IDENTIFIER_LEN: usize = 8;

/// Canonical (uppercase) 8-character document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse a token, accepting any case.
    ///
    /// Returns `None` unless the token is exactly eight ASCII letters or digits.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let well_formed =
            token.len() == IDENTIFIER_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric());
        well_formed.then(|| Self(token.to_ascii_uppercase()))
    }

    /// The canonical uppercase form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            crate::Error::config(format!(
                "'{s}' is not a valid document key ({IDENTIFIER_LEN} letters or digits)"
            ))
        })
    }
}

impl TryFrom<String> for DocumentId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Derive the document identifier for `path`.
///
/// The segment right after `storage_root` names the document. When the root
/// is not a prefix of the path, the parent directory's name is used instead.
#[must_use]
pub fn extract_identifier(path: &Path, storage_root: &Path) -> Option<DocumentId> {
    let path = normalize(path);
    let root = normalize(storage_root);
    let root = root.trim_end_matches('/');

    let candidate = match strip_root(&path, root) {
        Some(rest) => rest.split('/').find(|s| !s.is_empty()),
        None => parent_name(&path),
    };

    candidate.and_then(DocumentId::parse)
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Strip `root` from `path` only on a segment boundary.
fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn parent_name(path: &str) -> Option<&str> {
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    segments.next()?;
    segments.next()
}
