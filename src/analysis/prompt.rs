//! Prompt templates and tag extraction.

use std::collections::HashSet;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use super::context::ContextSelection;
use crate::models::ChatMessage;
use crate::watcher::DocumentId;
use crate::{Error, Result};

/// Most tags kept from a keyword fallback.
pub const MAX_FALLBACK_TAGS: usize = 8;

const BUILTIN_PREAMBLE: &str = "\
You are a careful research assistant. Read the paper below and write a structured \
analysis in Markdown with these sections:

## Summary
## Research Question
## Methods
## Key Findings
## Limitations
## Relevance and Follow-up Reading

Be specific: cite numbers, datasets and named methods from the text. If part of \
the paper was omitted, say which conclusions may be affected.";

static FRONT_MATTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---\r?\n?").expect("valid regex"));

static TAGS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*TAGS:[ \t]*(\[.*\])[ \t]*$").expect("valid regex"));

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]{5,200})\]").expect("valid regex"));

/// Instructions plus the allowed tag vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub preamble: String,
    pub tags: Vec<String>,
}

impl PromptTemplate {
    /// The template used when no prompt file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            preamble: BUILTIN_PREAMBLE.to_string(),
            tags: Vec::new(),
        }
    }

    /// Parse a Markdown prompt, taking the tag whitelist from a `tags`
    /// front-matter entry (inline `[a, b]` or a `- item` list).
    #[must_use]
    pub fn parse(markdown: &str) -> Self {
        let (tags, body) = match FRONT_MATTER.captures(markdown) {
            Some(caps) => {
                let whole = caps.get(0).map_or(0, |m| m.end());
                let header = caps.get(1).map_or("", |m| m.as_str());
                (front_matter_tags(header), &markdown[whole..])
            }
            None => (Vec::new(), markdown),
        };

        let preamble = body.trim();
        Self {
            preamble: if preamble.is_empty() {
                BUILTIN_PREAMBLE.to_string()
            } else {
                preamble.to_string()
            },
            tags,
        }
    }

    /// Closing instruction asking for a machine-readable tags line.
    #[must_use]
    pub fn tag_instruction(&self) -> String {
        if self.tags.is_empty() {
            "Finish with a single line of the form TAGS: [\"tag1\", \"tag2\"] \
             listing 3 to 8 short topic tags."
                .to_string()
        } else {
            format!(
                "Finish with a single line of the form TAGS: [\"tag1\", \"tag2\"] \
                 listing 3 to 8 tags chosen only from: {}.",
                self.tags.join(", ")
            )
        }
    }
}

fn front_matter_tags(header: &str) -> Vec<String> {
    let mut lines = header.lines();
    while let Some(line) = lines.next() {
        let Some(value) = line.trim_start().strip_prefix("tags:") else {
            continue;
        };
        let value = value.trim();

        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            return split_tag_list(inner);
        }
        if value.is_empty() {
            return lines
                .map(str::trim)
                .take_while(|l| l.starts_with('-'))
                .map(|l| clean_tag(&l[1..]))
                .filter(|t| !t.is_empty())
                .collect();
        }
        return split_tag_list(value);
    }
    Vec::new()
}

fn split_tag_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(clean_tag)
        .filter(|t| !t.is_empty())
        .collect()
}

fn clean_tag(raw: &str) -> String {
    raw.trim().trim_matches(['"', '\'']).trim().to_string()
}

/// Where the prompt template comes from. Loaded once per run.
pub trait PromptSource: Send + Sync {
    /// Load the current template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template exists but cannot be read.
    fn load(&self) -> Result<PromptTemplate>;
}

/// Always the built-in template.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPrompt;

impl PromptSource for BuiltinPrompt {
    fn load(&self) -> Result<PromptTemplate> {
        Ok(PromptTemplate::builtin())
    }
}

/// A Markdown prompt file, re-read on every load so edits apply to the next run.
#[derive(Debug, Clone)]
pub struct FilePromptSource {
    path: PathBuf,
}

impl FilePromptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PromptSource for FilePromptSource {
    fn load(&self) -> Result<PromptTemplate> {
        match std::fs::read_to_string(&self.path) {
            Ok(markdown) => Ok(PromptTemplate::parse(&markdown)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Prompt file missing, using built-in template");
                Ok(PromptTemplate::builtin())
            }
            Err(e) => Err(Error::collaborator(
                "prompt source",
                format!("{}: {e}", self.path.display()),
            )),
        }
    }
}

/// Assemble the chat messages for one analysis.
#[must_use]
pub fn build_messages(
    template: &PromptTemplate,
    id: &DocumentId,
    selection: &ContextSelection,
) -> Vec<ChatMessage> {
    let coverage = &selection.coverage;
    let header = if coverage.is_complete() {
        format!("Document {id} (full text, {} characters).", coverage.total_chars())
    } else {
        format!(
            "Document {id} ({coverage}). The middle of the paper was omitted; \
             the text below is its beginning and its end."
        )
    };

    vec![
        ChatMessage::system(template.preamble.clone()),
        ChatMessage::user(format!(
            "{header}\n\n{}\n\n{}",
            selection.text,
            template.tag_instruction()
        )),
    ]
}

/// Extract tags from a finished analysis.
///
/// Looks for a `TAGS: [...]` line, then any bracketed JSON string list.
/// With a non-empty `whitelist`, only listed tags survive, and when nothing
/// parseable is found the whitelist entries mentioned in the text are used
/// instead (at most [`MAX_FALLBACK_TAGS`]).
#[must_use]
pub fn extract_tags(analysis: &str, whitelist: &[String]) -> Vec<String> {
    let allowed: HashSet<&str> = whitelist.iter().map(String::as_str).collect();
    let keep = |tags: Vec<String>| -> Vec<String> {
        let mut seen = HashSet::new();
        tags.into_iter()
            .filter(|t| allowed.is_empty() || allowed.contains(t.as_str()))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    };

    let tags_line = TAGS_LINE
        .captures_iter(analysis)
        .filter_map(|caps| caps.get(1))
        .last()
        .and_then(|m| parse_string_list(m.as_str()));
    if let Some(tags) = tags_line.map(&keep).filter(|t| !t.is_empty()) {
        return tags;
    }

    for caps in BRACKETED.captures_iter(analysis) {
        let Some(inner) = caps.get(1) else { continue };
        let Some(tags) = parse_string_list(&format!("[{}]", inner.as_str())) else {
            continue;
        };
        let tags = keep(tags);
        if !tags.is_empty() {
            return tags;
        }
    }

    whitelist
        .iter()
        .filter(|tag| analysis.contains(tag.as_str()))
        .take(MAX_FALLBACK_TAGS)
        .cloned()
        .collect()
}

fn parse_string_list(json: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = serde_json::from_str(json).ok()?;
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}

/// Remove the trailing `TAGS: [...]` line, returning the body and the removed line.
#[must_use]
pub fn strip_tags_line(analysis: &str) -> (&str, Option<&str>) {
    let trimmed = analysis.trim_end();
    let (body, last) = match trimmed.rfind('\n') {
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    };

    if TAGS_LINE.is_match(last) {
        (body.trim_end(), Some(last.trim()))
    } else {
        (trimmed, None)
    }
}
