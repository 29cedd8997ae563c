use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Error;
use crate::parser;
use crate::types::WatchExpression;

/// Enumerate documentation files under the doc root whose extension has a
/// registered comment pattern. Applies the config's include/ignore filters
/// and the `recursive` toggle. Paths are returned relative to the doc root,
/// sorted so discovery order is stable across runs.
pub fn discover_documents(config: &Config) -> Vec<PathBuf> {
    let root = &config.doc_root;
    let walker = if config.recursive {
        WalkDir::new(root)
    } else {
        WalkDir::new(root).max_depth(1)
    };

    let mut documents: Vec<PathBuf> = walker
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| {
            return entry
                .map_err(|e| {
                    warn!(error = %e, "skipping unreadable directory entry");
                    return e;
                })
                .ok();
        })
        .filter(|e| return e.file_type().is_file())
        .filter(|e| return config.comment_patterns.supports(e.path()))
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path()).to_path_buf();
            if config.should_scan(&relative.to_string_lossy()) {
                return Some(relative);
            }
            return None;
        })
        .collect();

    documents.dedup();
    debug!(count = documents.len(), root = %root.display(), "discovered documentation files");
    return documents;
}

/// Scan every documentation file and extract its watch expressions in
/// discovery order.
///
/// # Errors
///
/// Returns `Error::Io` if a discovered documentation file cannot be read.
pub fn scan(config: &Config) -> Result<Vec<WatchExpression>, Error> {
    let mut expressions = Vec::new();
    for document in discover_documents(config) {
        let mut found = parser::parse_file(config, &document)?;
        expressions.append(&mut found);
    }
    return Ok(expressions);
}

/// Collapse `.` and `..` components in a path without touching the filesystem.
/// Preserves leading `..` when there is nothing left to pop.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        push_normalized_component(&mut components, component);
    }
    return components.iter().collect();
}

/// Handle a single path component during normalization.
/// Pops the last component for `..` when possible, preserves it otherwise.
fn push_normalized_component<'a>(components: &mut Vec<Component<'a>>, component: Component<'a>) {
    match component {
        Component::CurDir => {},
        Component::ParentDir => {
            let can_pop = matches!(components.last(), Some(c) if !matches!(c, Component::ParentDir));
            if can_pop {
                components.pop();
            } else {
                components.push(component);
            }
        },
        Component::Normal(_) | Component::Prefix(_) | Component::RootDir => components.push(component),
    }
    return;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(normalize_path(Path::new("./docs/../src/lib.rs")), PathBuf::from("src/lib.rs"));
        assert_eq!(normalize_path(Path::new("../a/./b")), PathBuf::from("../a/b"));
    }

    #[test]
    fn discovers_registered_extensions_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "");
        write(dir.path(), "docs/guide.md", "");
        write(dir.path(), "docs/notes.txt", "");
        write(dir.path(), ".watch-code/snapshots/stray.md", "");

        let config = Config::load(dir.path()).unwrap();
        let docs = discover_documents(&config);
        assert_eq!(docs, [PathBuf::from("README.md"), PathBuf::from("docs/guide.md")]);
    }

    #[test]
    fn non_recursive_stays_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "");
        write(dir.path(), "docs/guide.md", "");
        std::fs::write(dir.path().join(".docwatch.toml"), "recursive = false").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(discover_documents(&config), [PathBuf::from("README.md")]);
    }

    #[test]
    fn scan_collects_expressions_in_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "<!-- @watch src/a.rs:1-2 -->\n");
        write(dir.path(), "b.md", "<!-- @watch src/b.rs -->\n");

        let config = Config::load(dir.path()).unwrap();
        let found = scan(&config).unwrap();
        let sources: Vec<_> = found.iter().map(|w| w.source_file_path.clone()).collect();
        assert_eq!(sources, [PathBuf::from("src/a.rs"), PathBuf::from("src/b.rs")]);
    }
}
