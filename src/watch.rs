//! File watcher: runs `compare` on startup, then re-runs on doc or source changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use tracing::{debug, info, warn};

use crate::commands;
use crate::diagnostics;
use crate::error;
use crate::freshness::Session;

/// Debounce delay between filesystem events and re-check.
const DEBOUNCE_MS: u64 = 100;

/// Parent directories of every watched source file.
fn collect_source_dirs(session: &Session) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();
    for key in session.targets() {
        let full = session.config.source_path(&key.source_file_path);
        if let Some(parent) = full.parent() {
            dirs.insert(parent.to_path_buf());
        }
    }
    return dirs;
}

/// Create a filesystem watcher that sends events on the given channel.
/// Events under the snapshot directory are dropped so stored snapshots
/// never trigger a re-check.
///
/// # Errors
///
/// Returns `Error::WatcherFailed` if the watcher cannot be created.
fn create_watcher(
    tx: crossbeam_channel::Sender<()>,
    snapshot_dir: PathBuf,
) -> Result<notify::RecommendedWatcher, error::Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
            )
            && !event.paths.iter().all(|p| return p.starts_with(&snapshot_dir))
        {
            let _ = tx.send(());
        }
    })
    .map_err(|e| {
        return error::Error::WatcherFailed { reason: format!("watcher setup failed: {e}") };
    });
}

/// Entry point for the watch command.
///
/// Runs an initial compare, then watches the doc root and every watched
/// source's directory and re-compares on changes.
///
/// # Errors
///
/// Returns config or scan errors, or `Error::WatcherFailed` if the watcher
/// cannot be set up or the doc root cannot be watched.
pub fn run(root: &Path) -> Result<ExitCode, error::Error> {
    eprintln!("watch: initial compare");
    let mut last_code = run_compare(root);

    let session = Session::open(root)?;
    let doc_root = session.config.doc_root.clone();
    let source_dirs = collect_source_dirs(&session);

    let (tx, rx) = crossbeam_channel::unbounded();
    let snapshot_dir = session.config.snapshot_dir();
    let snapshot_dir = std::fs::canonicalize(&snapshot_dir).unwrap_or(snapshot_dir);
    let mut watcher = create_watcher(tx, snapshot_dir)?;

    let mode = if session.config.recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
    watcher.watch(&doc_root, mode).map_err(|e| {
        return error::Error::WatcherFailed { reason: format!("cannot watch {}: {e}", doc_root.display()) };
    })?;

    let mut watched = 1_usize;
    for dir in source_dirs.iter().filter(|d| return !d.starts_with(&doc_root) || !session.config.recursive) {
        if !dir.exists() {
            continue;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => watched = watched.saturating_add(1),
            Err(e) => warn!(dir = %dir.display(), error = %e, "cannot watch source directory"),
        }
    }
    info!(directories = watched, "watching");
    eprintln!("watch: monitoring {watched} directories, press Ctrl+C to stop");

    while rx.recv().is_ok() {
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        while rx.recv_timeout(debounce).is_ok() {}
        debug!("change batch received");
        eprintln!("watch: change detected, re-comparing...");
        last_code = run_compare(root);
    }

    return Ok(last_code);
}

/// Run compare once and print result. Returns the exit code from compare.
fn run_compare(root: &Path) -> ExitCode {
    return match commands::compare(root, false) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(3_u8)
        },
    };
}
