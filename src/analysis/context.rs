//! Fitting document text into a character budget.
//!
//! Long documents keep their opening (abstract, introduction, methods) and
//! their closing (results, discussion, conclusions) and drop the middle.

use std::fmt;

use serde::Serialize;

/// Inserted between head and tail when the middle is dropped.
pub const ELISION_MARKER: &str =
    "\n\n[... middle of the document omitted to fit the context budget ...]\n\n";

/// Share of the usable budget given to the head.
pub const HEAD_FRACTION: f64 = 0.67;

/// How much of the document the model was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coverage {
    /// The whole text.
    Complete { total_chars: usize },
    /// Head and tail only.
    Partial {
        head_chars: usize,
        tail_chars: usize,
        total_chars: usize,
        percent: u8,
    },
}

impl Coverage {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// Rounded share of the document shown, 100 when complete.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        match self {
            Self::Complete { .. } => 100,
            Self::Partial { percent, .. } => *percent,
        }
    }

    #[must_use]
    pub const fn total_chars(&self) -> usize {
        match self {
            Self::Complete { total_chars } | Self::Partial { total_chars, .. } => *total_chars,
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete { total_chars } => write!(f, "complete ({total_chars} chars)"),
            Self::Partial {
                head_chars,
                tail_chars,
                total_chars,
                percent,
            } => write!(
                f,
                "partial, {percent}% ({head_chars} head + {tail_chars} tail of {total_chars} chars)"
            ),
        }
    }
}

/// Text to send to the model plus its coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSelection {
    pub text: String,
    pub coverage: Coverage,
}

/// Select at most `budget_chars` characters of `text`.
///
/// Lengths are counted in `char`s. When the text exceeds the budget, the
/// budget minus the marker length is split 67/33 between head and tail and
/// the two pieces are joined with [`ELISION_MARKER`]. A budget too small to
/// hold the marker falls back to plain head truncation.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn select_context(text: &str, budget_chars: usize) -> ContextSelection {
    let total = text.chars().count();
    if total <= budget_chars {
        return ContextSelection {
            text: text.to_string(),
            coverage: Coverage::Complete { total_chars: total },
        };
    }

    let percent = ((budget_chars as f64 / total as f64) * 100.0).round() as u8;
    let marker_len = ELISION_MARKER.chars().count();

    if budget_chars <= marker_len {
        return ContextSelection {
            text: text[..byte_offset(text, budget_chars)].to_string(),
            coverage: Coverage::Partial {
                head_chars: budget_chars,
                tail_chars: 0,
                total_chars: total,
                percent,
            },
        };
    }

    let usable = budget_chars - marker_len;
    let head_chars = (usable as f64 * HEAD_FRACTION).floor() as usize;
    let tail_chars = usable - head_chars;

    let head = &text[..byte_offset(text, head_chars)];
    let tail = &text[byte_offset(text, total - tail_chars)..];

    let mut selected = String::with_capacity(head.len() + ELISION_MARKER.len() + tail.len());
    selected.push_str(head);
    selected.push_str(ELISION_MARKER);
    selected.push_str(tail);

    ContextSelection {
        text: selected,
        coverage: Coverage::Partial {
            head_chars,
            tail_chars,
            total_chars: total,
            percent,
        },
    }
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_len() -> usize {
        ELISION_MARKER.chars().count()
    }

    fn numbered_text(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + u8::try_from(i % 26).unwrap()))
            .collect()
    }

    #[test]
    fn test_short_document_is_complete() {
        let text = numbered_text(48_271);
        let selection = select_context(&text, 60_000);

        assert_eq!(selection.text, text);
        assert_eq!(selection.coverage, Coverage::Complete { total_chars: 48_271 });
        assert_eq!(selection.coverage.percent(), 100);
    }

    #[test]
    fn test_exact_budget_is_complete() {
        let text = numbered_text(1_000);
        assert!(select_context(&text, 1_000).coverage.is_complete());
    }

    #[test]
    fn test_long_document_keeps_head_and_tail() {
        let text = numbered_text(150_000);
        let selection = select_context(&text, 60_000);

        let Coverage::Partial {
            head_chars,
            tail_chars,
            total_chars,
            percent,
        } = selection.coverage
        else {
            panic!("expected partial coverage");
        };

        assert_eq!(total_chars, 150_000);
        assert_eq!(percent, 40);
        assert!(head_chars.abs_diff(40_200) < 100, "head was {head_chars}");
        assert!(tail_chars.abs_diff(19_800) < 100, "tail was {tail_chars}");
        assert_eq!(selection.text.chars().count(), 60_000);

        assert!(text.starts_with(&selection.text[..head_chars]));
        assert!(selection.text.ends_with(&text[150_000 - tail_chars..]));
        assert!(selection.text.contains(ELISION_MARKER));
    }

    #[test]
    fn test_coverage_display() {
        let text = numbered_text(150_000);
        let coverage = select_context(&text, 60_000).coverage;

        insta::assert_snapshot!(
            coverage.to_string(),
            @"partial, 40% (40153 head + 19777 tail of 150000 chars)"
        );
        assert_eq!(
            Coverage::Complete { total_chars: 12 }.to_string(),
            "complete (12 chars)"
        );
    }

    #[test]
    fn test_selection_never_exceeds_budget() {
        for total in [100, 999, 5_000, 20_001] {
            for budget in [10, marker_len(), marker_len() + 1, 500, 4_999, 20_000] {
                let text = numbered_text(total);
                let selection = select_context(&text, budget);
                let len = selection.text.chars().count();

                if total <= budget {
                    assert_eq!(len, total);
                    assert!(selection.coverage.is_complete());
                } else {
                    assert_eq!(len, budget, "total={total} budget={budget}");
                    assert!(selection.coverage.percent() <= 100);
                }
            }
        }
    }

    #[test]
    fn test_tiny_budget_truncates_head_only() {
        let text = numbered_text(1_000);
        let selection = select_context(&text, 20);

        assert_eq!(selection.text, text[..20]);
        assert_eq!(
            selection.coverage,
            Coverage::Partial {
                head_chars: 20,
                tail_chars: 0,
                total_chars: 1_000,
                percent: 2,
            }
        );
    }

    #[test]
    fn test_multibyte_text_is_cut_on_char_boundaries() {
        let text = "é".repeat(10_000) + &"ü".repeat(10_000);
        let selection = select_context(&text, 1_000);

        assert_eq!(selection.text.chars().count(), 1_000);
        assert!(selection.text.starts_with('é'));
        assert!(selection.text.ends_with('ü'));
    }

    #[test]
    fn test_coverage_serializes_with_kind() {
        let json = serde_json::to_value(Coverage::Complete { total_chars: 5 }).unwrap();
        assert_eq!(json["kind"], "complete");
        assert_eq!(json["total_chars"], 5);
    }
}
