//! Core CLI commands for docwatch: init, update, compare, status, clean.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::warn;

use crate::compare::Outcome;
use crate::error;
use crate::freshness::{self, FixSummary, Session, TargetResult};
use crate::scanner;
use crate::snapshot;
use crate::types::{Identity as _, TargetKey, WatchExpression};

/// Per-outcome tallies over distinct targets.
#[derive(Debug, Default)]
struct Tally {
    /// Content differs.
    changed: u32,
    /// Ranges that can never be captured.
    invalid: u32,
    /// Relocations left unresolved.
    moved: u32,
    /// Targets still lacking a snapshot.
    new: u32,
    /// Sources that are gone.
    source_missing: u32,
}

impl Tally {
    /// Count results, discounting what `--fix` resolved.
    fn from_results(results: &[TargetResult], fixed: Option<&FixSummary>) -> Self {
        let mut tally = Self::default();
        for result in results {
            let resolved = fixed.is_some_and(|f| {
                return f.relocated.contains(&result.key) || f.recorded.contains(&result.key);
            });
            let slot = match result.comparison.outcome {
                Outcome::Changed => &mut tally.changed,
                Outcome::Equal => continue,
                Outcome::Invalid => &mut tally.invalid,
                Outcome::MissingSnapshot if !resolved => &mut tally.new,
                Outcome::MissingSource => &mut tally.source_missing,
                Outcome::RelocatedViaBottomOffset | Outcome::RelocatedViaSearch if !resolved => &mut tally.moved,
                Outcome::MissingSnapshot | Outcome::RelocatedViaBottomOffset | Outcome::RelocatedViaSearch => {
                    continue;
                },
            };
            *slot = slot.saturating_add(1);
        }
        return tally;
    }

    /// Exit code priority: missing source (2) > anything unresolved (1) > clean (0).
    fn exit_status(&self, failures: usize) -> u8 {
        if self.source_missing > 0 {
            return 2;
        }
        if self.changed > 0 || self.invalid > 0 || self.moved > 0 || self.new > 0 || failures > 0 {
            return 1;
        }
        return 0;
    }
}

/// Delete snapshots no current watch expression maps to.
///
/// # Errors
///
/// Returns config or scan errors, or `Error::Io` from the sweep.
pub fn clean(root: &Path) -> Result<(), error::Error> {
    let mut session = Session::open(root)?;
    let live = session.live_keys();
    let removed = session.store.sweep(&live)?;
    eprintln!("Removed {removed} unused snapshots");
    return Ok(());
}

/// Compare every watched target and print a report. With `fix`, rewrite
/// comments of relocated targets and record missing snapshots first.
///
/// # Errors
///
/// Returns config or scan errors (fatal), or errors flushing the store.
/// Per-target failures show up in the report instead.
pub fn compare(root: &Path, fix: bool) -> Result<ExitCode, error::Error> {
    let mut session = Session::open(root)?;
    let results = freshness::evaluate_all(&mut session);

    let summary = if fix { Some(freshness::apply_fixes(&mut session, &results)?) } else { None };

    let by_key: HashMap<&TargetKey, &TargetResult> = results.iter().map(|r| return (&r.key, r)).collect();
    for expression in &session.expressions {
        let Some(result) = by_key.get(&expression.identity_key()) else {
            continue;
        };
        if let Some(line) = report_line(expression, result, summary.as_ref()) {
            println!("{line}");
        }
    }

    let failures = summary.as_ref().map_or(0, |s| return s.failures.len());
    for failure in summary.iter().flat_map(|s| return s.failures.iter()) {
        println!("ERROR    {failure}");
    }

    if summary.as_ref().is_some_and(|s| return !s.updates.is_empty()) {
        sweep_after_fix(root);
    }

    let tally = Tally::from_results(&results, summary.as_ref());
    print_summary(&tally, results.len(), failures);
    if !fix {
        print_hints(&tally);
    }
    return Ok(ExitCode::from(tally.exit_status(failures)));
}

/// Fingerprint every watched target that has no snapshot yet.
///
/// # Errors
///
/// Returns config or scan errors, or errors flushing the store.
pub fn init(root: &Path) -> Result<(), error::Error> {
    let mut session = Session::open(root)?;
    let mut recorded = 0_u32;
    let mut skipped = 0_u32;
    let mut failed = 0_u32;

    for key in session.targets() {
        if session.store.exists(&key) {
            skipped = skipped.saturating_add(1);
            continue;
        }
        if record(&mut session, &key) {
            recorded = recorded.saturating_add(1);
        } else {
            failed = failed.saturating_add(1);
        }
    }
    session.store.flush()?;

    eprintln!("Recorded {recorded} snapshots ({skipped} already present, {failed} failed)");
    return Ok(());
}

/// Output a comprehensive reference document for docwatch.
pub fn info(root: &Path, json: bool) {
    return crate::info::run(root, json);
}

/// Label and detail text for one expression's outcome.
fn describe(expression: &WatchExpression, result: &TargetResult, fixed: Option<&FixSummary>) -> (&'static str, String) {
    let key = &result.key;
    let resolved_move = fixed.is_some_and(|f| return f.relocated.contains(key));
    let recorded = fixed.is_some_and(|f| return f.recorded.contains(key));
    let origin = format!("({}:{})", expression.doc_file_path.display(), expression.doc_comment_range);

    return match result.comparison.outcome {
        Outcome::Changed => ("CHANGED", format!("{key}  {origin}")),
        Outcome::Equal => ("EQUAL", format!("{key}  {origin}")),
        Outcome::Invalid => {
            let reason = result.comparison.error.as_deref().unwrap_or("cannot be captured");
            ("ERROR", format!("{key}  {reason}  {origin}"))
        },
        Outcome::MissingSnapshot => {
            let note = if recorded { "  recorded" } else { "" };
            ("NEW", format!("{key}{note}  {origin}"))
        },
        Outcome::MissingSource => ("MISSING", format!("{key}  {origin}")),
        Outcome::RelocatedViaBottomOffset | Outcome::RelocatedViaSearch => {
            let to = result.relocated_to().map_or_else(|| return "?".to_string(), |r| return r.to_string());
            let via = if result.comparison.outcome == Outcome::RelocatedViaSearch { "content search" } else { "bottom offset" };
            let note = if resolved_move { ", fixed" } else { "" };
            ("MOVED", format!("{key} -> {to} ({via}{note})  {origin}"))
        },
    };
}

/// Print recovery hints to stderr for what `compare` left unresolved.
fn print_hints(tally: &Tally) {
    if tally.moved > 0 || tally.new > 0 {
        eprintln!();
        eprintln!("hint: run `docwatch compare --fix` to rewrite moved ranges and record new targets");
    }
    if tally.invalid > 0 {
        eprintln!("hint: correct the line ranges reported as ERROR in the documentation");
    }
    if tally.changed > 0 {
        eprintln!("hint: review the referencing docs, then run `docwatch update` to accept changes");
    }
    return;
}

/// Print the closing summary line.
fn print_summary(tally: &Tally, total: usize, failures: usize) {
    let unresolved = [tally.changed, tally.invalid, tally.moved, tally.new, tally.source_missing];
    if unresolved.iter().all(|n| return *n == 0) && failures == 0 {
        println!("All {total} watched targets up to date");
        return;
    }
    println!();
    println!(
        "{} changed, {} moved, {} missing, {} new, {} invalid",
        tally.changed, tally.moved, tally.source_missing, tally.new, tally.invalid,
    );
    return;
}

/// Fingerprint one target and store it. Failures are logged.
fn record(session: &mut Session, key: &TargetKey) -> bool {
    let snapshot = match snapshot::fingerprint(&session.config, key, session.options) {
        Ok(s) => s,
        Err(e) => {
            warn!(target_key = %key, error = %e, "could not fingerprint target");
            return false;
        },
    };
    if let Err(e) = session.store.save(snapshot) {
        warn!(target_key = %key, error = %e, "could not store snapshot");
        return false;
    }
    return true;
}

/// Report line for one expression, or `None` when there is nothing to say.
fn report_line(expression: &WatchExpression, result: &TargetResult, fixed: Option<&FixSummary>) -> Option<String> {
    if result.comparison.outcome == Outcome::Equal {
        return None;
    }
    let (label, detail) = describe(expression, result, fixed);
    return Some(format!("{label:<8} {detail}"));
}

/// Show every expression and its outcome. Never writes, always exits 0.
///
/// # Errors
///
/// Returns config or scan errors.
pub fn status(root: &Path) -> Result<(), error::Error> {
    let mut session = Session::open(root)?;
    let results = freshness::evaluate_all(&mut session);
    let by_key: HashMap<&TargetKey, &TargetResult> = results.iter().map(|r| return (&r.key, r)).collect();

    for expression in &session.expressions {
        let Some(result) = by_key.get(&expression.identity_key()) else {
            continue;
        };
        let (label, detail) = describe(expression, result, None);
        println!("{label:<8} {detail}");
    }
    return Ok(());
}

/// Drop snapshots orphaned by a rewrite. Failures only warn; the report
/// already reflects what was fixed.
fn sweep_after_fix(root: &Path) {
    match Session::open(root) {
        Ok(mut refreshed) => {
            let live = refreshed.live_keys();
            if let Err(e) = refreshed.store.sweep(&live) {
                warn!(error = %e, "could not sweep unused snapshots");
            }
        },
        Err(e) => warn!(error = %e, "could not rescan after rewrite"),
    }
    return;
}

/// Re-fingerprint watched targets, overwriting their snapshots. With
/// `from`, only targets referenced from that documentation file; without
/// it, every target, followed by the unused-snapshot sweep.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `from` names a document with no watch
/// expressions, config or scan errors, or store errors.
pub fn update(root: &Path, from: Option<&str>) -> Result<(), error::Error> {
    let mut session = Session::open(root)?;

    let targets = match from {
        None => session.targets(),
        Some(doc) => {
            let wanted = doc_relative(&session.config.doc_root, doc);
            let picked: Vec<WatchExpression> =
                session.expressions.iter().filter(|e| return e.doc_file_path == wanted).cloned().collect();
            if picked.is_empty() {
                return Err(error::Error::FileNotFound { path: PathBuf::from(doc) });
            }
            freshness::unique_targets(&picked)
        },
    };

    let mut updated = 0_u32;
    let mut failed = 0_u32;
    for key in &targets {
        if record(&mut session, key) {
            updated = updated.saturating_add(1);
        } else {
            failed = failed.saturating_add(1);
        }
    }
    session.store.flush()?;

    match from {
        None => {
            let live = session.live_keys();
            let removed = session.store.sweep(&live)?;
            eprintln!("Updated {updated} snapshots ({failed} failed), removed {removed} unused");
        },
        Some(doc) => eprintln!("Updated {updated} snapshots from {doc} ({failed} failed)"),
    }
    return Ok(());
}

/// Express a user-supplied document path relative to the doc root.
fn doc_relative(doc_root: &Path, doc: &str) -> PathBuf {
    let wanted = scanner::normalize_path(Path::new(doc));
    let root = scanner::normalize_path(doc_root);
    return wanted.strip_prefix(&root).map_or_else(|_| return wanted.clone(), Path::to_path_buf);
}
