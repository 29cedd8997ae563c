//! Comparison of a stored snapshot against the current source, with
//! relocation fallbacks for ranges that moved without changing.

use std::fmt;

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::Error;
use crate::snapshot::{self, FingerprintOptions, Snapshot, SourceText};
use crate::types::{LineRange, TargetKey};

/// Terminal classification of one watched target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The content differs and could not be found elsewhere.
    Changed,
    /// The content is unchanged at the recorded range.
    Equal,
    /// The watched range can never be captured, e.g. zero or inverted.
    Invalid,
    /// No snapshot was recorded for the target.
    MissingSnapshot,
    /// The source file is gone or unreadable.
    MissingSource,
    /// Found at the same distance from the end of the file.
    RelocatedViaBottomOffset,
    /// Found by scanning the whole file for the recorded content.
    RelocatedViaSearch,
}

impl Outcome {
    /// Whether the target moved and its comment needs a new range.
    pub const fn is_relocation(self) -> bool {
        return matches!(self, Self::RelocatedViaBottomOffset | Self::RelocatedViaSearch);
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Changed => "changed",
            Self::Equal => "equal",
            Self::Invalid => "invalid",
            Self::MissingSnapshot => "missing snapshot",
            Self::MissingSource => "missing source",
            Self::RelocatedViaBottomOffset => "moved (bottom offset)",
            Self::RelocatedViaSearch => "moved (content search)",
        };
        return f.write_str(label);
    }
}

/// Result of comparing one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Why the target could not be captured. Set only for `Invalid`.
    pub error: Option<String>,
    /// Classification.
    pub outcome: Outcome,
    /// Fingerprint of the current source: at the new range for relocations,
    /// at the recorded range otherwise. `None` when the source is missing or
    /// the recorded range can no longer be captured.
    pub snapshot: Option<Snapshot>,
}

impl Comparison {
    /// A comparison that reached a classification.
    pub const fn new(outcome: Outcome, snapshot: Option<Snapshot>) -> Self {
        return Self { error: None, outcome, snapshot };
    }

    /// A target whose range cannot be captured at all.
    pub fn invalid(reason: &Error) -> Self {
        return Self { error: Some(reason.to_string()), outcome: Outcome::Invalid, snapshot: None };
    }
}

/// A relocation found by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Which strategy found it.
    pub outcome: Outcome,
    /// Where the content lives now.
    pub range: LineRange,
}

/// One way of finding a moved range. Strategies are tried in order and the
/// first one that returns a relocation wins.
pub trait RelocationStrategy {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Look for `old`'s content in the current source.
    fn relocate(&self, old: &Snapshot, range: LineRange, source: &SourceText, options: FingerprintOptions)
        -> Option<Relocation>;
}

/// Re-applies the recorded distance from end-of-file. Recovers lines
/// inserted (or removed) only above the watched block.
pub struct BottomOffset;

impl RelocationStrategy for BottomOffset {
    fn name(&self) -> &'static str {
        return "bottom-offset";
    }

    fn relocate(&self, old: &Snapshot, _range: LineRange, source: &SourceText, options: FingerprintOptions)
        -> Option<Relocation> {
        let reversed = old.reversed_line_range?;
        let candidate = reversed.reverse(source.total_lines())?;
        if !matches_at(old, candidate, source, options) {
            return None;
        }
        return Some(Relocation { outcome: Outcome::RelocatedViaBottomOffset, range: candidate });
    }
}

/// Slides a window of the recorded length over the whole file. When several
/// windows match, the one closest to the recorded start wins, earlier first.
pub struct ContentSearch;

impl RelocationStrategy for ContentSearch {
    fn name(&self) -> &'static str {
        return "content-search";
    }

    fn relocate(&self, old: &Snapshot, range: LineRange, source: &SourceText, options: FingerprintOptions)
        -> Option<Relocation> {
        let length = range.length();
        let total = source.total_lines();
        if length == 0 || length > total {
            return None;
        }
        let last_start = total.saturating_sub(length).saturating_add(1);

        let mut best: Option<LineRange> = None;
        for start in 1..=last_start {
            let candidate = LineRange::new(start, start.saturating_add(length).saturating_sub(1));
            if !matches_at(old, candidate, source, options) {
                continue;
            }
            let closer = best.is_none_or(|b| return start.abs_diff(range.start) < b.start.abs_diff(range.start));
            if closer {
                best = Some(candidate);
            }
        }

        let found = best?;
        return Some(Relocation { outcome: Outcome::RelocatedViaSearch, range: found });
    }
}

/// Relocation strategies in the order they are tried.
pub const STRATEGIES: &[&dyn RelocationStrategy] = &[&BottomOffset, &ContentSearch];

/// Compare a stored snapshot against the current source file.
///
/// The source is checked first, so a deleted file is `MissingSource` no
/// matter what was recorded. Without a snapshot the result is
/// `MissingSnapshot` carrying a fresh capture. A range that cannot be
/// captured and has nothing recorded to relocate from is `Invalid`.
/// Whole-file targets never relocate.
pub fn compare(config: &Config, key: &TargetKey, old: Option<&Snapshot>, options: FingerprintOptions) -> Comparison {
    let path = config.source_path(&key.source_file_path);
    let source = match SourceText::read(&path) {
        Ok(source) => source,
        Err(e) => {
            debug!(target_key = %key, error = %e, "source unavailable");
            return Comparison::new(Outcome::MissingSource, None);
        },
    };
    return compare_text(key, old, &source, options);
}

/// [`compare`] against already-loaded source text.
pub fn compare_text(
    key: &TargetKey,
    old: Option<&Snapshot>,
    source: &SourceText,
    options: FingerprintOptions,
) -> Comparison {
    let current = snapshot::capture(key, source, options);
    if let Err(e @ Error::InvalidRange { .. }) = &current {
        return Comparison::invalid(e);
    }
    let Some(old) = old else {
        return match current {
            Ok(fresh) => Comparison::new(Outcome::MissingSnapshot, Some(fresh)),
            Err(e) => Comparison::invalid(&e),
        };
    };
    if old.source_file_path != key.source_file_path {
        return Comparison::new(Outcome::Changed, current.ok());
    }

    if let Ok(current) = &current
        && current.content_equals(old)
    {
        return Comparison::new(Outcome::Equal, Some(current.clone()));
    }

    let fallback = current.ok();
    let Some(range) = old.line_range else {
        return Comparison::new(Outcome::Changed, fallback);
    };

    for strategy in STRATEGIES {
        let Some(relocation) = strategy.relocate(old, range, source, options) else {
            trace!(target_key = %key, strategy = strategy.name(), "no match");
            continue;
        };
        let moved_key = TargetKey::new(key.source_file_path.clone(), Some(relocation.range));
        match snapshot::capture(&moved_key, source, options) {
            Ok(moved) => {
                debug!(target_key = %key, strategy = strategy.name(), to = %relocation.range, "relocated");
                return Comparison::new(relocation.outcome, Some(moved));
            },
            Err(e) => trace!(target_key = %key, error = %e, "relocated range could not be captured"),
        }
    }

    return Comparison::new(Outcome::Changed, fallback);
}

/// Capture `candidate` and compare it with the recorded content.
fn matches_at(old: &Snapshot, candidate: LineRange, source: &SourceText, options: FingerprintOptions) -> bool {
    let key = TargetKey::new(old.source_file_path.clone(), Some(candidate));
    return snapshot::capture(&key, source, options).is_ok_and(|current| return current.content_equals(old));
}
