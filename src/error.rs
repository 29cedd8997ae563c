/// Crate-level error types for docwatch diagnostics.
use std::path::PathBuf;

use crate::types::LineRange;

/// All errors in docwatch carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, range, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The documentation comment recorded for a rewrite no longer matches
    /// any configured delimiter pair.
    #[error("comment not found at lines {range} in {}", file.display())]
    CommentNotFound {
        /// Documentation file that was searched.
        file: PathBuf,
        /// Recorded line range of the comment.
        range: LineRange,
    },

    /// A configuration value is absent or unusable. Always fatal.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// Description of the offending value.
        reason: String,
    },

    /// A referenced source or documentation file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A snapshot file holds the other layout (array vs. single record).
    #[error("snapshot format mismatch in {}: expected {expected}", path.display())]
    FormatMismatch {
        /// Layout the caller asked for.
        expected: &'static str,
        /// Snapshot file that was read.
        path: PathBuf,
    },

    /// A line range is structurally invalid (zero bound or end before start).
    #[error("invalid line range {range} for {}: {reason}", file.display())]
    InvalidRange {
        /// Source file the range refers to.
        file: PathBuf,
        /// The rejected range.
        range: LineRange,
        /// Which rule the range broke.
        reason: &'static str,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// Snapshot JSON could not be (de)serialized.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A watch expression or comment pattern could not be parsed.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File containing the malformed text.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A line range reaches past the end of the source file.
    #[error("line range {range} exceeds {total} lines in {}", file.display())]
    RangeOutOfBounds {
        /// Source file the range refers to.
        file: PathBuf,
        /// The requested range.
        range: LineRange,
        /// Number of lines actually present.
        total: u32,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No comment delimiters are registered for this documentation extension.
    #[error("no comment pattern for extension: .{ext}")]
    UnknownExtension {
        /// File extension without the leading dot.
        ext: String,
    },

    /// The filesystem watcher could not be created.
    #[error("watcher failed: {reason}")]
    WatcherFailed {
        /// Description of the watcher failure.
        reason: String,
    },
}
