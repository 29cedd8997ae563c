//! Snapshot records and fingerprint computation.

use std::fs::File;
use std::io::{BufRead as _, BufReader, Read as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::hasher::{self, HashAlgorithm};
use crate::types::{Identity, LineRange, TargetKey};

/// Settings that shape a fingerprint. Both sides of a comparison must use
/// the same options for equal content to compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintOptions {
    /// Digest for compressed units and whole-file snapshots.
    pub algorithm: HashAlgorithm,
    /// Collapse captured lines into one hash.
    pub compress: bool,
}

impl FingerprintOptions {
    /// Options taken from the project configuration.
    pub const fn from_config(config: &Config) -> Self {
        return Self { algorithm: config.hash_algorithm, compress: config.compress };
    }
}

/// Persisted record of a watched target's content at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Watched lines; `None` for whole-file snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    /// Verbatim lines, or a single hash when compressed or whole-file.
    pub lines: Vec<String>,
    /// `line_range` as offsets from end-of-file. Present iff `line_range` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_line_range: Option<LineRange>,
    /// Source file relative to the source root.
    #[serde(alias = "watchExpressionFilePath")]
    pub source_file_path: PathBuf,
    /// Line count of the file at capture time.
    pub total_lines_in_file: u32,
}

impl Snapshot {
    /// Content equality: same source path, same number of units, each unit
    /// equal positionally. Ranges are deliberately not compared so a
    /// relocated capture can be matched against the original.
    pub fn content_equals(&self, other: &Self) -> bool {
        return self.source_file_path == other.source_file_path && self.lines == other.lines;
    }
}

impl Identity for Snapshot {
    fn identity_key(&self) -> TargetKey {
        return TargetKey::new(self.source_file_path.clone(), self.line_range);
    }
}

/// A source file loaded once so several strategies can probe it.
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Raw file bytes, used for whole-file hashes.
    pub content: Vec<u8>,
    /// Lines without terminators. Invalid UTF-8 is replaced, not rejected.
    pub lines: Vec<String>,
}

impl SourceText {
    /// Split loaded content into lines.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let lines = String::from_utf8_lossy(&content).lines().map(String::from).collect();
        return Self { content, lines };
    }

    /// Read a source file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if it is absent, `Error::Io` otherwise.
    pub fn read(path: &Path) -> Result<Self, Error> {
        return match std::fs::read(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::FileNotFound { path: path.to_path_buf() })
            },
            Err(e) => Err(Error::Io(e)),
            Ok(content) => Ok(Self::new(content)),
        };
    }

    /// Number of lines in the file.
    pub fn total_lines(&self) -> u32 {
        return u32::try_from(self.lines.len()).unwrap_or(u32::MAX);
    }
}

/// Fingerprint a target from already-loaded text.
///
/// # Errors
///
/// Returns `Error::InvalidRange` for a zero or inverted range, or
/// `Error::RangeOutOfBounds` if the range ends past the last line.
pub fn capture(key: &TargetKey, source: &SourceText, options: FingerprintOptions) -> Result<Snapshot, Error> {
    let total = source.total_lines();
    let Some(range) = key.line_range else {
        return Ok(whole_file_snapshot(key, &source.content, total, options));
    };
    validate_range(key, range)?;

    let first = usize::try_from(range.start.saturating_sub(1)).unwrap_or(usize::MAX);
    let last = usize::try_from(range.end).unwrap_or(usize::MAX);
    let Some(captured) = source.lines.get(first..last) else {
        return Err(Error::RangeOutOfBounds { file: key.source_file_path.clone(), range, total });
    };

    return ranged_snapshot(key, range, captured.to_vec(), total, options);
}

/// Fingerprint a target by streaming its source file top to bottom. Ranged
/// targets keep reading past the range to learn the total line count, which
/// the reversed range needs.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the source is absent, `Error::Io` on read
/// failure, `Error::InvalidRange` for a zero or inverted range, and
/// `Error::RangeOutOfBounds` if the range ends past the last line.
pub fn fingerprint(config: &Config, key: &TargetKey, options: FingerprintOptions) -> Result<Snapshot, Error> {
    if let Some(range) = key.line_range {
        validate_range(key, range)?;
    }

    let path = config.source_path(&key.source_file_path);
    let file = match File::open(&path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(f) => f,
    };
    let mut reader = BufReader::new(file);

    let Some(range) = key.line_range else {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let total = count_lines(&bytes);
        return Ok(whole_file_snapshot(key, &bytes, total, options));
    };

    let mut captured = Vec::new();
    let mut total = 0_u32;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        total = total.saturating_add(1);
        if range.contains(total) {
            captured.push(decode_line(&mut buf));
        }
    }

    if range.end > total {
        return Err(Error::RangeOutOfBounds { file: key.source_file_path.clone(), range, total });
    }
    return ranged_snapshot(key, range, captured, total, options);
}

/// Strip the terminator the way `str::lines` does, then decode lossily.
fn decode_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    return String::from_utf8_lossy(buf).into_owned();
}

/// Line count that agrees with `str::lines` for the same bytes.
fn count_lines(bytes: &[u8]) -> u32 {
    let text = String::from_utf8_lossy(bytes);
    return u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
}

/// Build a ranged snapshot, compressing the captured lines if requested.
///
/// # Errors
///
/// Returns `Error::RangeOutOfBounds` if the reversed range cannot be formed.
fn ranged_snapshot(
    key: &TargetKey,
    range: LineRange,
    captured: Vec<String>,
    total: u32,
    options: FingerprintOptions,
) -> Result<Snapshot, Error> {
    let Some(reversed) = range.reverse(total) else {
        return Err(Error::RangeOutOfBounds { file: key.source_file_path.clone(), range, total });
    };
    let lines = if options.compress {
        vec![hasher::digest_lines(options.algorithm, &captured)]
    } else {
        captured
    };
    return Ok(Snapshot {
        line_range: Some(range),
        lines,
        reversed_line_range: Some(reversed),
        source_file_path: key.source_file_path.clone(),
        total_lines_in_file: total,
    });
}

/// Reject ranges that cannot address real lines.
///
/// # Errors
///
/// Returns `Error::InvalidRange` with the broken rule.
fn validate_range(key: &TargetKey, range: LineRange) -> Result<(), Error> {
    if let Some(reason) = range.validate_reason() {
        return Err(Error::InvalidRange { file: key.source_file_path.clone(), range, reason });
    }
    return Ok(());
}

/// Whole-file snapshots are always a single hash of the raw bytes.
fn whole_file_snapshot(key: &TargetKey, bytes: &[u8], total: u32, options: FingerprintOptions) -> Snapshot {
    return Snapshot {
        line_range: None,
        lines: vec![hasher::digest(options.algorithm, bytes)],
        reversed_line_range: None,
        source_file_path: key.source_file_path.clone(),
        total_lines_in_file: total,
    };
}
