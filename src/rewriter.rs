//! Rewrites one documentation comment so its watch expressions carry new
//! line ranges. Only the comment's bytes are replaced and the file is
//! written by full overwrite; nothing is written if any step fails.

use std::path::Path;

use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::parser::line_at_offset;
use crate::patterns::DelimiterPair;
use crate::types::{LineRange, WatchExpression};

/// One expression of the comment being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct RewriteEntry<'a> {
    /// The expression as parsed this run.
    pub expression: &'a WatchExpression,
    /// New range when the target was relocated; `None` keeps the original.
    pub relocated_to: Option<LineRange>,
}

/// An expression whose range was rewritten, before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteUpdate {
    /// Expression as it was parsed.
    pub old: WatchExpression,
    /// Expression as it now reads in the documentation file.
    pub updated: WatchExpression,
}

/// Find the delimiter pair that opens exactly at `offset` and the end of
/// the comment it opens, exclusive.
fn locate_comment<'a>(text: &str, pairs: &'a [DelimiterPair], offset: usize) -> Option<(&'a DelimiterPair, usize)> {
    let from_open = text.get(offset..)?;
    for pair in pairs {
        let Some(body) = from_open.strip_prefix(pair.start.as_str()) else {
            continue;
        };
        let Some(close_at) = body.find(pair.end.as_str()) else {
            continue;
        };
        let end = offset.saturating_add(pair.start.len()).saturating_add(close_at).saturating_add(pair.end.len());
        return Some((pair, end));
    }
    return None;
}

/// Leading whitespace of a line.
fn indentation(line: &str) -> &str {
    let trimmed = line.trim_start();
    let width = line.len().saturating_sub(trimmed.len());
    return line.get(..width).unwrap_or("");
}

/// Render the comment itself, delimiters included, spread over at most
/// `max_lines` lines. `continuation` supplies the indentation of line `i`.
fn render_comment(
    pair: &DelimiterPair,
    trigger: &str,
    targets: &[String],
    max_lines: usize,
    continuation: &dyn Fn(usize) -> String,
) -> Vec<String> {
    let line_count = max_lines.min(targets.len()).max(1);
    let per_line = targets.len().div_ceil(line_count).max(1);
    let chunks: Vec<String> = targets.chunks(per_line).map(|c| return c.join(", ")).collect();
    let last_index = chunks.len().saturating_sub(1);

    let mut rendered = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let mut line = if i == 0 {
            format!("{} {trigger} {chunk}", pair.start)
        } else {
            format!("{}{chunk}", continuation(i))
        };
        if i == last_index {
            line.push(' ');
            line.push_str(&pair.end);
        } else {
            line.push(',');
        }
        rendered.push(line);
    }
    return rendered;
}

/// Render one target as `path` or `path:range`, quoting paths the parser
/// would otherwise split.
pub fn render_target(path: &Path, range: Option<LineRange>) -> String {
    let raw = path.to_string_lossy();
    let needs_quotes = raw.chars().any(|c| return c.is_whitespace() || c == ',' || c == ':');
    let path = if needs_quotes { format!("\"{raw}\"") } else { raw.into_owned() };
    return match range {
        None => path,
        Some(range) => format!("{path}:{range}"),
    };
}

/// Rewrite the comment shared by `entries` in its documentation file.
///
/// Relocated entries get their new range, the rest keep the range they were
/// parsed with. The rebuilt comment never has more lines than the original.
/// Returns the relocated expressions before and after the rewrite.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if entries belong to different comments,
/// `Error::UnknownExtension` if the document has no comment pattern,
/// `Error::FileNotFound` if it vanished, `Error::CommentNotFound` if the
/// recorded lines no longer hold a delimited comment, or `Error::Io` on
/// write failure. The file is left untouched on any error.
pub fn rewrite(config: &Config, entries: &[RewriteEntry<'_>]) -> Result<Vec<RewriteUpdate>, Error> {
    let Some(first) = entries.first().map(|e| return e.expression) else {
        return Ok(Vec::new());
    };
    if entries.iter().any(|e| return !e.expression.shares_comment_with(first)) {
        return Err(Error::ParseFailed {
            file: first.doc_file_path.clone(),
            reason: "rewrite group spans several comments".to_string(),
        });
    }

    let pairs = config.comment_patterns.pairs_for_path(&first.doc_file_path)?;
    let full_path = config.doc_root.join(&first.doc_file_path);
    let text = match std::fs::read_to_string(&full_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: full_path });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(t) => t,
    };

    let (rewritten, new_range) = rewrite_text(&text, pairs, entries)?;
    std::fs::write(&full_path, rewritten)?;
    debug!(doc = %first.doc_file_path.display(), comment = %first.doc_comment_range, "rewrote comment");

    let updates = entries
        .iter()
        .filter_map(|entry| {
            let moved = entry.relocated_to?;
            if entry.expression.line_range.is_none() {
                return None;
            }
            let mut updated = entry.expression.clone();
            updated.line_range = Some(moved);
            updated.doc_comment_range = new_range;
            return Some(RewriteUpdate { old: entry.expression.clone(), updated });
        })
        .collect();
    return Ok(updates);
}

/// Rebuild a document with the group's comment re-rendered. Only the
/// comment's own bytes change; text around it, including other comments on
/// the same lines and CRLF line endings, is kept as is. Returns the new
/// document text and the comment's new line range.
///
/// # Errors
///
/// Returns `Error::CommentNotFound` if no delimiter pair opens a comment at
/// the recorded offset, or that comment no longer spans the recorded lines.
pub fn rewrite_text(
    text: &str,
    pairs: &[DelimiterPair],
    entries: &[RewriteEntry<'_>],
) -> Result<(String, LineRange), Error> {
    let Some(first) = entries.first().map(|e| return e.expression) else {
        return Ok((text.to_string(), LineRange::single(1)));
    };
    let comment = first.doc_comment_range;
    let not_found = || {
        return Error::CommentNotFound { file: first.doc_file_path.clone(), range: comment };
    };

    let offset = first.doc_comment_offset;
    let (pair, end) = locate_comment(text, pairs, offset).ok_or_else(not_found)?;
    let (Some(before), Some(original), Some(after)) = (text.get(..offset), text.get(offset..end), text.get(end..))
    else {
        return Err(not_found());
    };
    let spanned = LineRange::new(line_at_offset(text, offset), line_at_offset(text, end));
    if spanned != comment {
        return Err(not_found());
    }

    let targets: Vec<String> = entries
        .iter()
        .map(|e| {
            let range = if e.expression.line_range.is_some() {
                e.relocated_to.or(e.expression.line_range)
            } else {
                None
            };
            return render_target(&e.expression.source_file_path, range);
        })
        .collect();

    let original_lines: Vec<&str> = original.split('\n').collect();
    let continuation = |i: usize| {
        let indent = original_lines.get(i).map_or("  ", |l| return indentation(l));
        return if indent.is_empty() { "  ".to_string() } else { indent.to_string() };
    };
    let rendered = render_comment(pair, &first.trigger, &targets, original_lines.len(), &continuation);

    let newline = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let document = format!("{before}{}{after}", rendered.join(newline));

    let added = u32::try_from(rendered.len()).unwrap_or(1).saturating_sub(1);
    let new_range = LineRange::new(comment.start, comment.start.saturating_add(added));
    return Ok((document, new_range));
}
