use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;
use crate::types::LineRange;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
    return;
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is
/// one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::CommentNotFound { file, range } => render_comment_not_found(file, *range),
        Error::ConfigInvalid { reason } => render_config_invalid(reason),
        Error::FormatMismatch { expected, path } => render_format_mismatch(expected, path),
        Error::RangeOutOfBounds { file, range, total } => render_out_of_bounds(file, *range, *total),
        Error::TomlDe(inner) => render_config_invalid(&inner.to_string()),
        Error::UnknownExtension { ext } => render_unknown_extension(ext),
        Error::FileNotFound { .. }
        | Error::InvalidRange { .. }
        | Error::Io(_)
        | Error::Json(_)
        | Error::ParseFailed { .. }
        | Error::WatcherFailed { .. } => render_generic(e),
    };
}

fn render_comment_not_found(file: &Path, range: LineRange) -> String {
    return format!("\
# Error: Comment Not Found

Lines {range} of `{}` no longer hold a watch comment.

## Fix

The document changed since it was scanned. Re-run:

    docwatch compare --fix
", file.display());
}

fn render_config_invalid(reason: &str) -> String {
    return format!("\
# Error: Invalid Config

{reason}

## Fix

Correct `{CONFIG_FILE}`, or run `docwatch info` to see every key and its default.
");
}

fn render_format_mismatch(expected: &str, path: &Path) -> String {
    return format!("\
# Error: Snapshot Format Mismatch

`{}` does not hold a {expected}. The `combine` setting probably changed.

## Fix

Re-record every snapshot under the current layout:

    docwatch update
", path.display());
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::FileNotFound { path } => format!("\
# Error: File Not Found

`{}` does not exist.
", path.display()),

        Error::Io(inner) => format!("\
# Error: I/O

{inner}
"),

        Error::ParseFailed { file, reason } => format!("\
# Error: Parse Failed

Could not parse `{}`: {reason}
", file.display()),

        Error::WatcherFailed { reason } => format!("\
# Error: Watcher Failed

{reason}
"),

        Error::CommentNotFound { .. }
        | Error::ConfigInvalid { .. }
        | Error::FormatMismatch { .. }
        | Error::InvalidRange { .. }
        | Error::Json(_)
        | Error::RangeOutOfBounds { .. }
        | Error::TomlDe(_)
        | Error::UnknownExtension { .. } => format!("\
# Error

{e}
"),
    };
}

fn render_out_of_bounds(file: &Path, range: LineRange, total: u32) -> String {
    return format!("\
# Error: Line Range Out Of Bounds

`{}` has {total} lines; the watch expression asks for {range}.

## Fix

Point the watch expression at lines that exist, then run:

    docwatch update
", file.display());
}

fn render_unknown_extension(ext: &str) -> String {
    return format!("\
# Error: Unknown Documentation Extension

No comment delimiters are registered for `.{ext}` files.

## Fix

Add them to `{CONFIG_FILE}`:

    [[comment_patterns.{ext}]]
    start = \"<!--\"
    end = \"-->\"
");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn config_errors_point_at_the_config_file() {
        let out = render_error(&Error::ConfigInvalid { reason: "trigger_keywords is empty".to_string() });
        assert!(out.starts_with("# Error: Invalid Config"));
        assert!(out.contains("trigger_keywords is empty"));
        assert!(out.contains(CONFIG_FILE));
    }

    #[test]
    fn unknown_extension_suggests_a_pattern_block() {
        let out = render_error(&Error::UnknownExtension { ext: "rst".to_string() });
        assert!(out.contains("[[comment_patterns.rst]]"));
    }

    #[test]
    fn other_errors_fall_back_to_their_message() {
        let out = render_error(&Error::InvalidRange {
            file: PathBuf::from("src/lib.rs"),
            range: LineRange::new(5, 3),
            reason: "end before start",
        });
        assert!(out.starts_with("# Error\n"));
        assert!(out.contains("end before start"));
    }
}
