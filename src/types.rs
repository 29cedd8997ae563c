/// Core domain types: line ranges, watched-target identities, watch expressions.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Anything that names a watched target. Used for snapshot file naming,
/// cache lookups, and de-duplication.
pub trait Identity {
    /// The `(source file, line range)` pair identifying the watched target.
    fn identity_key(&self) -> TargetKey;
}

/// Inclusive `[start, end]` line interval, one-based for real lines.
/// Offsets produced by [`LineRange::reverse`] may contain zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineRange {
    /// Last line of the interval.
    pub end: u32,
    /// First line of the interval.
    pub start: u32,
}

impl LineRange {
    /// Build a range without validation; see [`LineRange::validate_reason`].
    pub const fn new(start: u32, end: u32) -> Self {
        return Self { end, start };
    }

    /// Build a range covering a single line.
    pub const fn single(line: u32) -> Self {
        return Self { end: line, start: line };
    }

    /// Whether `line` lies inside the interval.
    pub const fn contains(&self, line: u32) -> bool {
        return self.start <= line && line <= self.end;
    }

    /// Number of lines covered, `end - start + 1`. Zero for inverted ranges.
    pub const fn length(&self) -> u32 {
        if self.end < self.start {
            return 0;
        }
        return (self.end - self.start).saturating_add(1);
    }

    /// Express the range as offsets counted from the end of a file with
    /// `total` lines: `(total - end, total - start)`. Applying it twice with
    /// the same `total` returns the original range. `None` when the range
    /// reaches past `total`.
    pub const fn reverse(&self, total: u32) -> Option<Self> {
        let Some(start) = total.checked_sub(self.end) else {
            return None;
        };
        let Some(end) = total.checked_sub(self.start) else {
            return None;
        };
        return Some(Self { end, start });
    }

    /// Explain why the range cannot address real lines, if it can't.
    pub const fn validate_reason(&self) -> Option<&'static str> {
        if self.start == 0 || self.end == 0 {
            return Some("line numbers start at 1");
        }
        if self.end < self.start {
            return Some("end is before start");
        }
        return None;
    }
}

impl fmt::Display for LineRange {
    /// Short form: `7` for a single line, `3-5` otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            return write!(f, "{}", self.start);
        }
        return write!(f, "{}-{}", self.start, self.end);
    }
}

/// Identity of a watched target. Two watch expressions or snapshots with
/// equal keys refer to the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    /// Watched lines; `None` watches the whole file.
    pub line_range: Option<LineRange>,
    /// Source file relative to the source root.
    pub source_file_path: PathBuf,
}

impl TargetKey {
    /// Build a key from its parts.
    pub fn new(source_file_path: impl Into<PathBuf>, line_range: Option<LineRange>) -> Self {
        return Self { line_range, source_file_path: source_file_path.into() };
    }
}

impl fmt::Display for TargetKey {
    /// Renders `path` or `path:range`, the form used in comments and file naming.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.source_file_path.to_string_lossy();
        return match self.line_range {
            None => write!(f, "{path}"),
            Some(range) => write!(f, "{path}:{range}"),
        };
    }
}

/// One reference inside a documentation comment. Rebuilt by parsing on
/// every run; only the derived snapshot is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchExpression {
    /// Byte offset where the owning comment opens in the documentation file.
    pub doc_comment_offset: usize,
    /// Physical lines of the owning comment in the documentation file.
    pub doc_comment_range: LineRange,
    /// Documentation file containing the comment, relative to the doc root.
    pub doc_file_path: PathBuf,
    /// Watched lines; `None` watches the whole file.
    pub line_range: Option<LineRange>,
    /// Source file relative to the source root.
    pub source_file_path: PathBuf,
    /// Trigger keyword that introduced the comment.
    pub trigger: String,
}

impl WatchExpression {
    /// Whether two expressions live in the same documentation comment.
    pub fn shares_comment_with(&self, other: &Self) -> bool {
        return self.doc_file_path == other.doc_file_path
            && self.doc_comment_offset == other.doc_comment_offset;
    }

    /// Key of the owning comment, used to group expressions for rewriting.
    /// Two comments on one line differ by offset.
    pub fn comment_location(&self) -> (&Path, usize) {
        return (self.doc_file_path.as_path(), self.doc_comment_offset);
    }
}

impl Identity for WatchExpression {
    fn identity_key(&self) -> TargetKey {
        return TargetKey::new(self.source_file_path.clone(), self.line_range);
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn length_counts_both_ends() {
        assert_eq!(LineRange::new(3, 5).length(), 3);
        assert_eq!(LineRange::single(9).length(), 1);
        assert_eq!(LineRange::new(5, 3).length(), 0);
    }

    #[test]
    fn reverse_is_an_involution() {
        for total in [5_u32, 10, 57] {
            for start in 1..=total {
                for end in start..=total {
                    let range = LineRange::new(start, end);
                    let reversed = range.reverse(total).unwrap();
                    assert_eq!(reversed.reverse(total), Some(range));
                }
            }
        }
    }

    #[test]
    fn reverse_rejects_ranges_past_the_end() {
        assert_eq!(LineRange::new(3, 12).reverse(10), None);
        assert_eq!(LineRange::new(3, 5).reverse(10), Some(LineRange::new(5, 7)));
    }

    #[test]
    fn display_uses_short_form() {
        assert_eq!(LineRange::new(3, 5).to_string(), "3-5");
        assert_eq!(LineRange::single(7).to_string(), "7");
        assert_eq!(TargetKey::new("src/a.rs", None).to_string(), "src/a.rs");
        assert_eq!(
            TargetKey::new("src/a.rs", Some(LineRange::new(1, 2))).to_string(),
            "src/a.rs:1-2"
        );
    }

    #[test]
    fn validate_reason_flags_zero_and_inverted() {
        assert!(LineRange::new(0, 3).validate_reason().is_some());
        assert!(LineRange::new(4, 3).validate_reason().is_some());
        assert!(LineRange::new(3, 3).validate_reason().is_none());
    }
}
