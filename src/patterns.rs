//! Comment delimiter registry keyed by documentation file extension.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A start/end delimiter pair that can enclose a watch expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterPair {
    /// Closing delimiter, e.g. `-->`.
    pub end: String,
    /// Opening delimiter, e.g. `<!--`.
    pub start: String,
}

impl DelimiterPair {
    /// Build a pair from its two delimiters.
    pub fn new(start: &str, end: &str) -> Self {
        return Self { end: end.to_string(), start: start.to_string() };
    }
}

/// Maps lowercase extensions (no leading dot) to their delimiter pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPatternRegistry {
    /// Extension -> delimiter pairs, in configuration order.
    by_extension: BTreeMap<String, Vec<DelimiterPair>>,
}

impl Default for CommentPatternRegistry {
    /// HTML-style comments for markdown and HTML documents.
    fn default() -> Self {
        let html = vec![DelimiterPair::new("<!--", "-->")];
        let mut by_extension = BTreeMap::new();
        for ext in ["html", "markdown", "md"] {
            by_extension.insert(ext.to_string(), html.clone());
        }
        return Self { by_extension };
    }
}

impl CommentPatternRegistry {
    /// Layer configured patterns over the defaults. A configured extension
    /// replaces the default pairs for that extension.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` if an extension is blank, has no pairs,
    /// or a pair has an empty side.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<DelimiterPair>>) -> Result<Self, Error> {
        let mut registry = Self::default();
        for (ext, pairs) in overrides {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            if ext.is_empty() {
                return Err(Error::ConfigInvalid {
                    reason: "comment_patterns has a blank extension".to_string(),
                });
            }
            if pairs.is_empty() {
                return Err(Error::ConfigInvalid {
                    reason: format!("comment_patterns.{ext} lists no delimiter pairs"),
                });
            }
            if pairs.iter().any(|p| return p.start.is_empty() || p.end.is_empty()) {
                return Err(Error::ConfigInvalid {
                    reason: format!("comment_patterns.{ext} has an empty delimiter"),
                });
            }
            registry.by_extension.insert(ext, pairs.clone());
        }
        return Ok(registry);
    }

    /// All registered extensions, sorted.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        return self.by_extension.keys().map(String::as_str);
    }

    /// Delimiter pairs for a documentation file, by its extension.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownExtension` if nothing is registered for it.
    pub fn pairs_for_path(&self, path: &Path) -> Result<&[DelimiterPair], Error> {
        let ext = path
            .extension()
            .and_then(|e| return e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        return match self.by_extension.get(&ext) {
            Some(pairs) => Ok(pairs.as_slice()),
            None => Err(Error::UnknownExtension { ext }),
        };
    }

    /// Whether a path carries a registered documentation extension.
    pub fn supports(&self, path: &Path) -> bool {
        return self.pairs_for_path(path).is_ok();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_markdown() {
        let registry = CommentPatternRegistry::default();
        let pairs = registry.pairs_for_path(Path::new("docs/README.MD")).unwrap();
        assert_eq!(pairs, [DelimiterPair::new("<!--", "-->")]);
        assert!(!registry.supports(Path::new("src/lib.rs")));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert(".adoc".to_string(), vec![DelimiterPair::new("////", "////")]);
        overrides.insert("md".to_string(), vec![DelimiterPair::new("[//]: # (", ")")]);
        let registry = CommentPatternRegistry::with_overrides(&overrides).unwrap();

        assert!(registry.supports(Path::new("guide.adoc")));
        let md = registry.pairs_for_path(Path::new("a.md")).unwrap();
        assert_eq!(md.len(), 1);
        assert_eq!(md.first().map(|p| p.start.as_str()), Some("[//]: # ("));
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("txt".to_string(), vec![DelimiterPair::new("", "*/")]);
        assert!(matches!(
            CommentPatternRegistry::with_overrides(&overrides),
            Err(Error::ConfigInvalid { .. })
        ));
    }
}
