//! Extraction of watch expressions from documentation comments.
//!
//! A comment qualifies when its trimmed body starts with a trigger keyword:
//!
//! ```text
//! <!-- @watch src/lib.rs:10-24, "docs dir/setup.sh":3, Cargo.toml -->
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::patterns::DelimiterPair;
use crate::scanner::normalize_path;
use crate::types::{LineRange, WatchExpression};

/// Path and optional range of one sub-expression, before it is attached to
/// its comment.
#[derive(Debug, PartialEq, Eq)]
struct ParsedTarget {
    /// Watched lines, if any.
    line_range: Option<LineRange>,
    /// Source path as written, normalized.
    path: PathBuf,
}

/// Build the lazy comment matcher for one delimiter pair.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the escaped pattern does not compile.
fn comment_regex(doc_path: &Path, pair: &DelimiterPair) -> Result<Regex, Error> {
    let pattern = format!("(?s){}(.*?){}", regex::escape(&pair.start), regex::escape(&pair.end));
    return Regex::new(&pattern).map_err(|e| {
        return Error::ParseFailed {
            file: doc_path.to_path_buf(),
            reason: format!("comment pattern `{} … {}`: {e}", pair.start, pair.end),
        };
    });
}

/// One-based line number of a byte offset, counting newlines before it.
pub fn line_at_offset(text: &str, offset: usize) -> u32 {
    let newlines = text
        .get(..offset)
        .map_or(0, |prefix| return prefix.bytes().filter(|b| return *b == b'\n').count());
    return u32::try_from(newlines).unwrap_or(u32::MAX).saturating_add(1);
}

/// Extract every watch expression from a documentation file's text.
/// Pure: `doc_path` is only recorded, never read.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if a delimiter pair cannot be compiled into a
/// matcher. Malformed sub-expressions are logged and skipped, not returned.
pub fn parse(
    doc_path: &Path,
    text: &str,
    pairs: &[DelimiterPair],
    triggers: &[String],
) -> Result<Vec<WatchExpression>, Error> {
    let mut expressions = Vec::new();

    for pair in pairs {
        let regex = comment_regex(doc_path, pair)?;
        for cap in regex.captures_iter(text) {
            let (Some(whole), Some(body)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let Some((trigger, rest)) = strip_trigger(body.as_str(), triggers) else {
                continue;
            };

            let doc_comment_range = LineRange::new(
                line_at_offset(text, whole.start()),
                line_at_offset(text, whole.end()),
            );

            for raw in split_targets(rest) {
                match parse_target(raw) {
                    Err(reason) => {
                        warn!(
                            doc = %doc_path.display(),
                            line = doc_comment_range.start,
                            expression = raw.trim(),
                            "skipping watch expression: {reason}"
                        );
                    },
                    Ok(target) => expressions.push(WatchExpression {
                        doc_comment_offset: whole.start(),
                        doc_comment_range,
                        doc_file_path: doc_path.to_path_buf(),
                        line_range: target.line_range,
                        source_file_path: target.path,
                        trigger: trigger.to_string(),
                    }),
                }
            }
        }
    }

    // Several delimiter pairs may match; keep document order.
    expressions.sort_by_key(|w| return w.doc_comment_offset);
    return Ok(expressions);
}

/// Read a documentation file (relative to the doc root) and parse it with
/// the delimiter pairs registered for its extension.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file is gone, `Error::Io` for other
/// read failures, `Error::UnknownExtension` for unregistered extensions.
pub fn parse_file(config: &Config, doc_path: &Path) -> Result<Vec<WatchExpression>, Error> {
    let pairs = config.comment_patterns.pairs_for_path(doc_path)?;
    let full_path = config.doc_root.join(doc_path);
    let text = match std::fs::read_to_string(&full_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: full_path });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(t) => t,
    };
    let expressions = parse(doc_path, &text, pairs, &config.trigger_keywords)?;
    debug!(doc = %doc_path.display(), count = expressions.len(), "parsed watch expressions");
    return Ok(expressions);
}

/// Parse a range suffix: `N` or `N-M`. `M >= N` is left to validation.
fn parse_range(raw: &str) -> Result<LineRange, String> {
    let parse_bound = |s: &str| {
        return s
            .trim()
            .parse::<u32>()
            .map_err(|e| return format!("bad line number `{}`: {e}", s.trim()));
    };
    return match raw.split_once('-') {
        None => Ok(LineRange::single(parse_bound(raw)?)),
        Some((start, end)) => Ok(LineRange::new(parse_bound(start)?, parse_bound(end)?)),
    };
}

/// Parse one sub-expression: `path`, `path:N`, `path:N-M`, path optionally
/// double-quoted.
fn parse_target(raw: &str) -> Result<ParsedTarget, String> {
    let raw = raw.trim();

    let (path, range) = if let Some(quoted) = raw.strip_prefix('"') {
        let Some((path, after)) = quoted.split_once('"') else {
            return Err("unterminated quote".to_string());
        };
        let after = after.trim_start();
        let range = match after.strip_prefix(':') {
            Some(r) => Some(r),
            None if after.is_empty() => None,
            None => return Err(format!("unexpected `{after}` after quoted path")),
        };
        (path, range)
    } else {
        match raw.rsplit_once(':') {
            Some((path, range)) => (path.trim_end(), Some(range)),
            None => (raw, None),
        }
    };

    if path.trim().is_empty() {
        return Err("empty path".to_string());
    }

    let line_range = match range {
        None => None,
        Some(r) => Some(parse_range(r)?),
    };
    return Ok(ParsedTarget { line_range, path: normalize_path(Path::new(path)) });
}

/// Split the text after the trigger on commas outside double quotes.
/// An unterminated quote ends at the next comma, so only that piece is
/// malformed. Blank pieces (e.g. a trailing comma) are dropped.
fn split_targets(rest: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut open_quote: Option<usize> = None;
    let mut piece_start = 0_usize;

    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => open_quote = if open_quote.is_some() { None } else { Some(idx) },
            ',' if open_quote.is_none() => {
                if let Some(piece) = rest.get(piece_start..idx) {
                    pieces.push(piece);
                }
                piece_start = idx.saturating_add(1);
            },
            _ => {},
        }
    }

    let resume = open_quote.and_then(|quote| {
        let comma = rest.get(quote..)?.find(',')?;
        return Some(quote.saturating_add(comma));
    });
    match resume {
        Some(comma) => {
            pieces.extend(rest.get(piece_start..comma));
            pieces.extend(rest.get(comma.saturating_add(1)..).map(split_targets).unwrap_or_default());
        },
        None => pieces.extend(rest.get(piece_start..)),
    }

    return pieces.into_iter().filter(|p| return !p.trim().is_empty()).collect();
}

/// If the trimmed comment body starts with a trigger keyword followed by
/// whitespace or nothing, return the keyword and the remaining text.
/// The longest matching keyword wins so `@watch-all` beats `@watch`.
fn strip_trigger<'a, 'b>(body: &'a str, triggers: &'b [String]) -> Option<(&'b str, &'a str)> {
    let body = body.trim();
    return triggers
        .iter()
        .filter_map(|keyword| {
            let rest = body.strip_prefix(keyword.as_str())?;
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some((keyword.as_str(), rest));
            }
            return None;
        })
        .max_by_key(|(keyword, _)| return keyword.len());
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    fn html() -> Vec<DelimiterPair> {
        return vec![DelimiterPair::new("<!--", "-->")];
    }

    fn watch() -> Vec<String> {
        return vec!["@watch".to_string()];
    }

    #[test]
    fn quoted_path_and_whole_file() {
        let text = "# Title\n<!-- @watch \"a b.txt\":2-4, c.txt -->\n";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].source_file_path, PathBuf::from("a b.txt"));
        assert_eq!(found[0].line_range, Some(LineRange::new(2, 4)));
        assert_eq!(found[1].source_file_path, PathBuf::from("c.txt"));
        assert_eq!(found[1].line_range, None);
        assert_eq!(found[0].doc_comment_range, LineRange::single(2));
        assert_eq!(found[0].doc_comment_offset, 8);
        assert!(found[0].shares_comment_with(&found[1]));
    }

    #[test]
    fn multi_line_comment_range_counts_newlines() {
        let text = "intro\n\n<!-- @watch src/a.rs:1,\n  src/b.rs:3-9\n-->\ntrailer\n";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].doc_comment_range, LineRange::new(3, 5));
        assert_eq!(found[0].line_range, Some(LineRange::single(1)));
        assert_eq!(found[1].line_range, Some(LineRange::new(3, 9)));
    }

    #[test]
    fn comments_on_one_line_stay_distinct() {
        let text = "A <!-- @watch a.rs:3-5 --> and B <!-- @watch b.rs:1 --> end\n";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].doc_comment_range, found[1].doc_comment_range);
        assert_eq!((found[0].doc_comment_offset, found[1].doc_comment_offset), (2, 33));
        assert!(!found[0].shares_comment_with(&found[1]));
    }

    #[test]
    fn comments_without_trigger_are_ignored() {
        let text = "<!-- just a note -->\n<!-- @watcher src/a.rs -->\n<!-- @watch -->\n";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn malformed_sub_expressions_are_skipped_individually() {
        let text = "<!-- @watch \"open.rs:1, ok.rs:2, bad.rs:x-3, :4, fine.rs -->";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();
        let paths: Vec<_> = found.iter().map(|w| w.source_file_path.clone()).collect();
        assert_eq!(paths, [PathBuf::from("ok.rs"), PathBuf::from("fine.rs")]);

        let text = "<!-- @watch ok.rs:2, bad.rs:x-3, :4, neg.rs:-1, fine.rs -->";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();
        let paths: Vec<_> = found.iter().map(|w| w.source_file_path.clone()).collect();
        assert_eq!(paths, [PathBuf::from("ok.rs"), PathBuf::from("fine.rs")]);
    }

    #[test]
    fn unterminated_quote_only_drops_its_own_piece() {
        let text = "<!-- @watch ok.rs:2, \"open.rs:1, fine.rs -->";
        let found = parse(Path::new("doc.md"), text, &html(), &watch()).unwrap();
        let paths: Vec<_> = found.iter().map(|w| w.source_file_path.clone()).collect();
        assert_eq!(paths, [PathBuf::from("ok.rs"), PathBuf::from("fine.rs")]);

        assert_eq!(split_targets(" a.rs, \"b, c.rs\":1, \"d.rs, e.rs"), [" a.rs", " \"b, c.rs\":1", " \"d.rs", " e.rs"]);
    }

    #[test]
    fn inverted_range_is_kept_for_later_validation() {
        let found = parse(Path::new("d.md"), "<!-- @watch a.rs:9-3 -->", &html(), &watch()).unwrap();
        assert_eq!(found[0].line_range, Some(LineRange::new(9, 3)));
    }

    #[test]
    fn longest_trigger_wins() {
        let triggers = vec!["@watch".to_string(), "@watch-all".to_string()];
        let found = parse(Path::new("d.md"), "<!-- @watch-all a.rs -->", &html(), &triggers).unwrap();
        assert_eq!(found[0].trigger, "@watch-all");
        assert_eq!(found[0].source_file_path, PathBuf::from("a.rs"));
    }

    #[test]
    fn quoted_path_may_contain_commas() {
        let found = parse(Path::new("d.md"), "<!-- @watch \"x, y.rs\":1 -->", &html(), &watch()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_file_path, PathBuf::from("x, y.rs"));
    }

    #[test]
    fn paths_are_normalized() {
        let found = parse(Path::new("d.md"), "<!-- @watch ./src/../lib/a.rs:3 -->", &html(), &watch()).unwrap();
        assert_eq!(found[0].source_file_path, PathBuf::from("lib/a.rs"));
    }
}
