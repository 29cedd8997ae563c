use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::hasher::HashAlgorithm;
use crate::patterns::{CommentPatternRegistry, DelimiterPair};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = ".docwatch.toml";

/// Raw TOML structure for `.docwatch.toml`. Every key is optional.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DocwatchTomlConfig {
    #[serde(default)]
    combine: bool,
    #[serde(default)]
    comment_patterns: BTreeMap<String, Vec<DelimiterPair>>,
    #[serde(default)]
    compress: bool,
    #[serde(default = "default_root")]
    doc_root: String,
    #[serde(default)]
    hash_algorithm: HashAlgorithm,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default = "default_root")]
    source_root: String,
    #[serde(default = "default_trigger_keywords")]
    trigger_keywords: Vec<String>,
    #[serde(default = "default_watch_code_dir")]
    watch_code_dir: String,
    #[serde(default = "default_working_dir")]
    working_dir: String,
}

impl Default for DocwatchTomlConfig {
    fn default() -> Self {
        return Self {
            combine: false,
            comment_patterns: BTreeMap::new(),
            compress: false,
            doc_root: default_root(),
            hash_algorithm: HashAlgorithm::default(),
            ignore: Vec::new(),
            include: Vec::new(),
            recursive: default_recursive(),
            source_root: default_root(),
            trigger_keywords: default_trigger_keywords(),
            watch_code_dir: default_watch_code_dir(),
            working_dir: default_working_dir(),
        };
    }
}

/// Serde default for `recursive`.
const fn default_recursive() -> bool {
    return true;
}

/// Serde default for `doc_root` and `source_root`.
fn default_root() -> String {
    return ".".to_string();
}

/// Serde default for `trigger_keywords`.
fn default_trigger_keywords() -> Vec<String> {
    return vec!["@watch".to_string()];
}

/// Serde default for `watch_code_dir`.
fn default_watch_code_dir() -> String {
    return ".watch-code".to_string();
}

/// Serde default for `working_dir`.
fn default_working_dir() -> String {
    return "snapshots".to_string();
}

/// Validated project configuration. Immutable once loaded and passed
/// explicitly to every operation that needs a path or a toggle.
#[derive(Debug, Clone)]
pub struct Config {
    /// Write one snapshot file per source file instead of per target.
    pub combine: bool,
    /// Delimiter pairs per documentation extension.
    pub comment_patterns: CommentPatternRegistry,
    /// Store one hash per captured range instead of verbatim lines.
    pub compress: bool,
    /// Root of the documentation tree.
    pub doc_root: PathBuf,
    /// Digest used for fingerprints and snapshot file names.
    pub hash_algorithm: HashAlgorithm,
    /// Documentation path prefixes (relative to `doc_root`) to skip.
    pub ignore: Vec<String>,
    /// Documentation path prefixes to scan; empty scans everything.
    pub include: Vec<String>,
    /// Descend into subdirectories of `doc_root`.
    pub recursive: bool,
    /// Root that watch expression paths are relative to.
    pub source_root: PathBuf,
    /// Keywords that mark a comment as holding watch expressions.
    pub trigger_keywords: Vec<String>,
    /// Directory under `doc_root` that holds docwatch state.
    pub watch_code_dir: PathBuf,
    /// Directory under `watch_code_dir` that holds snapshot files.
    pub working_dir: PathBuf,
}

impl Config {
    /// Load config from `.docwatch.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. Returns an error if the
    /// file exists but is malformed or invalid; never silently falls back to
    /// defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if a value fails validation.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DocwatchTomlConfig::default(),
            Err(e) => return Err(Error::Io(e)),
            Ok(content) => toml::from_str(&content)?,
        };
        return Self::from_raw(root, raw);
    }

    /// Parse and validate config text as if it were `root/.docwatch.toml`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` or `Error::ConfigInvalid`.
    pub fn parse(root: &Path, content: &str) -> Result<Self, Error> {
        let raw: DocwatchTomlConfig = toml::from_str(content)?;
        return Self::from_raw(root, raw);
    }

    /// Validate raw values and resolve directories against `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` naming the first offending key.
    fn from_raw(root: &Path, raw: DocwatchTomlConfig) -> Result<Self, Error> {
        require_non_blank("watch_code_dir", &raw.watch_code_dir)?;
        require_non_blank("working_dir", &raw.working_dir)?;
        if raw.trigger_keywords.is_empty() {
            return Err(Error::ConfigInvalid {
                reason: "trigger_keywords must list at least one keyword".to_string(),
            });
        }
        for keyword in &raw.trigger_keywords {
            require_non_blank("trigger_keywords", keyword)?;
        }

        let doc_root = require_directory("doc_root", root, &raw.doc_root)?;
        let source_root = require_directory("source_root", root, &raw.source_root)?;
        let comment_patterns = CommentPatternRegistry::with_overrides(&raw.comment_patterns)?;

        return Ok(Self {
            combine: raw.combine,
            comment_patterns,
            compress: raw.compress,
            doc_root,
            hash_algorithm: raw.hash_algorithm,
            ignore: raw.ignore,
            include: raw.include,
            recursive: raw.recursive,
            source_root,
            trigger_keywords: raw.trigger_keywords,
            watch_code_dir: PathBuf::from(raw.watch_code_dir),
            working_dir: PathBuf::from(raw.working_dir),
        });
    }

    /// Check whether a documentation file path should be scanned.
    ///
    /// A path is included if no include prefixes are set (scan everything),
    /// or if the path starts with at least one include prefix. An included
    /// path is then skipped if it starts with any ignore prefix or lives in
    /// the docwatch state directory.
    pub fn should_scan(&self, relative_path: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|p| return relative_path.starts_with(p.as_str()));

        if !included {
            return false;
        }

        let state_dir = self.watch_code_dir.to_string_lossy();
        if relative_path.starts_with(state_dir.as_ref()) {
            return false;
        }

        return !self.ignore.iter().any(|p| return relative_path.starts_with(p.as_str()));
    }

    /// Directory holding snapshot files: `doc_root/watch_code_dir/working_dir`.
    pub fn snapshot_dir(&self) -> PathBuf {
        return self.doc_root.join(&self.watch_code_dir).join(&self.working_dir);
    }

    /// Absolute-or-root-relative path of a watched source file.
    pub fn source_path(&self, relative: &Path) -> PathBuf {
        return self.source_root.join(relative);
    }
}

/// Resolve a configured directory against `root` and require it to exist.
///
/// # Errors
///
/// Returns `Error::ConfigInvalid` if the value is blank or not a directory.
fn require_directory(key: &str, root: &Path, value: &str) -> Result<PathBuf, Error> {
    require_non_blank(key, value)?;
    let path = root.join(value);
    if !path.is_dir() {
        return Err(Error::ConfigInvalid {
            reason: format!("{key} `{}` is not a directory", path.display()),
        });
    }
    return Ok(path);
}

/// Reject blank values for required keys.
///
/// # Errors
///
/// Returns `Error::ConfigInvalid` if the value is empty after trimming.
fn require_non_blank(key: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::ConfigInvalid {
            reason: format!("{key} must not be empty"),
        });
    }
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(!config.combine);
        assert!(!config.compress);
        assert!(config.recursive);
        assert_eq!(config.trigger_keywords, ["@watch"]);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            config.snapshot_dir(),
            dir.path().join(".").join(".watch-code").join("snapshots")
        );
    }

    #[test]
    fn parses_toggles_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let config = Config::parse(
            dir.path(),
            r#"
doc_root = "docs"
combine = true
compress = true
hash_algorithm = "blake3"
trigger_keywords = ["@watch", "@track"]

[[comment_patterns.rst]]
start = ".. "
end = " .."
"#,
        )
        .unwrap();
        assert!(config.combine);
        assert!(config.compress);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.doc_root, dir.path().join("docs"));
        assert!(config.comment_patterns.supports(Path::new("x.rst")));
    }

    #[test]
    fn blank_required_values_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        for content in ["working_dir = \"\"", "trigger_keywords = []", "trigger_keywords = [\" \"]"] {
            assert!(
                matches!(Config::parse(dir.path(), content), Err(Error::ConfigInvalid { .. })),
                "accepted: {content}"
            );
        }
    }

    #[test]
    fn missing_source_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::parse(dir.path(), "source_root = \"nope\"");
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn scan_filters_apply_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(dir.path(), "include = [\"docs/\"]\nignore = [\"docs/archive/\"]").unwrap();
        assert!(config.should_scan("docs/guide.md"));
        assert!(!config.should_scan("docs/archive/old.md"));
        assert!(!config.should_scan("README.md"));
        assert!(!config.should_scan(".watch-code/snapshots/x.md"));
    }
}
