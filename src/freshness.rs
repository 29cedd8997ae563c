//! Per-run state and the comparison pass over every watched target.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::compare::{self, Comparison, Outcome};
use crate::config::Config;
use crate::error;
use crate::rewriter::{self, RewriteEntry, RewriteUpdate};
use crate::scanner;
use crate::snapshot::{FingerprintOptions, Snapshot};
use crate::store::SnapshotStore;
use crate::types::{Identity as _, LineRange, TargetKey, WatchExpression};

/// Everything one command run needs: validated config, the expressions
/// parsed this run, and the snapshot store with its per-run cache.
pub struct Session {
    /// Validated configuration.
    pub config: Config,
    /// Watch expressions in discovery order.
    pub expressions: Vec<WatchExpression>,
    /// Fingerprint settings derived from the config.
    pub options: FingerprintOptions,
    /// Snapshot storage.
    pub store: SnapshotStore,
}

impl Session {
    /// Load config and parse every documentation file under `root`.
    ///
    /// # Errors
    ///
    /// Returns config errors (fatal, before any snapshot work) or `Error::Io`
    /// if a documentation file cannot be read.
    pub fn open(root: &Path) -> Result<Self, error::Error> {
        let config = Config::load(root)?;
        let expressions = scanner::scan(&config)?;
        let options = FingerprintOptions::from_config(&config);
        let store = SnapshotStore::new(&config);
        return Ok(Self { config, expressions, options, store });
    }

    /// Keys of every target referenced this run.
    pub fn live_keys(&self) -> HashSet<TargetKey> {
        return self.expressions.iter().map(|e| return e.identity_key()).collect();
    }

    /// Read a target's snapshot. Unreadable or wrong-layout snapshot files
    /// are reported and treated as absent.
    pub fn read_snapshot(&mut self, key: &TargetKey) -> Option<Snapshot> {
        return match self.store.read(key) {
            Ok(found) => found,
            Err(e) => {
                warn!(target_key = %key, error = %e, "snapshot unreadable, treating as missing");
                None
            },
        };
    }

    /// Distinct targets in discovery order.
    pub fn targets(&self) -> Vec<TargetKey> {
        return unique_targets(&self.expressions);
    }
}

/// Comparison of one target plus where it is referenced from.
pub struct TargetResult {
    /// Outcome and current fingerprint.
    pub comparison: Comparison,
    /// The target.
    pub key: TargetKey,
    /// First documentation location referencing the target.
    pub referenced_from: (PathBuf, LineRange),
}

impl TargetResult {
    /// New range of a relocated target.
    pub fn relocated_to(&self) -> Option<LineRange> {
        if !self.comparison.outcome.is_relocation() {
            return None;
        }
        return self.comparison.snapshot.as_ref().and_then(|s| return s.line_range);
    }
}

/// What `--fix` managed to do.
#[derive(Debug, Default)]
pub struct FixSummary {
    /// Comments that could not be rewritten, with the reason.
    pub failures: Vec<String>,
    /// Targets recorded for the first time.
    pub recorded: HashSet<TargetKey>,
    /// Relocated targets whose every referencing comment was rewritten.
    pub relocated: HashSet<TargetKey>,
    /// Expression pairs rewritten in documentation files.
    pub updates: Vec<RewriteUpdate>,
}

/// Rewrite comments of relocated targets and store their new snapshots.
/// Also records snapshots for targets that had none. Groups that fail to
/// rewrite are logged and skipped; their targets stay unresolved.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::Json` if staged combined snapshots cannot
/// be flushed. Per-group and per-target failures never propagate.
pub fn apply_fixes(session: &mut Session, results: &[TargetResult]) -> Result<FixSummary, error::Error> {
    let by_key: HashMap<&TargetKey, &TargetResult> = results.iter().map(|r| return (&r.key, r)).collect();
    let mut summary = FixSummary::default();

    for result in results {
        if result.comparison.outcome != Outcome::MissingSnapshot {
            continue;
        }
        let Some(snapshot) = result.comparison.snapshot.clone() else {
            continue;
        };
        match session.store.save(snapshot) {
            Ok(_) => {
                summary.recorded.insert(result.key.clone());
            },
            Err(e) => warn!(target_key = %result.key, error = %e, "could not record snapshot"),
        }
    }

    let mut unresolved: HashSet<TargetKey> = HashSet::new();
    let expressions = session.expressions.clone();
    for group in relocation_groups(&expressions, &by_key) {
        let entries: Vec<RewriteEntry<'_>> = group
            .iter()
            .map(|expression| {
                let relocated_to = by_key.get(&expression.identity_key()).and_then(|r| return r.relocated_to());
                return RewriteEntry { expression, relocated_to };
            })
            .collect();

        let updates = match rewriter::rewrite(&session.config, &entries) {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "skipping comment rewrite");
                if let Some(first) = group.first() {
                    summary.failures.push(format!("{}:{}  {e}", first.doc_file_path.display(), first.doc_comment_range));
                }
                for entry in entries.iter().filter(|e| return e.relocated_to.is_some()) {
                    unresolved.insert(entry.expression.identity_key());
                }
                continue;
            },
        };

        for update in updates {
            let old_key = update.old.identity_key();
            let Some(snapshot) = by_key.get(&old_key).and_then(|r| return r.comparison.snapshot.clone()) else {
                continue;
            };
            if let Err(e) = session.store.save(snapshot) {
                warn!(target_key = %old_key, error = %e, "could not store relocated snapshot");
                unresolved.insert(old_key);
                continue;
            }
            info!(from = %old_key, to = %update.updated.identity_key(), "relocated watch expression");
            summary.relocated.insert(old_key);
            summary.updates.push(update);
        }
    }

    summary.relocated.retain(|k| return !unresolved.contains(k));
    session.store.flush()?;
    return Ok(summary);
}

/// Compare every distinct target once, in discovery order.
pub fn evaluate_all(session: &mut Session) -> Vec<TargetResult> {
    let mut results = Vec::new();
    let mut seen: HashSet<TargetKey> = HashSet::new();
    let expressions = session.expressions.clone();

    for expression in &expressions {
        let key = expression.identity_key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let old = session.read_snapshot(&key);
        let comparison = compare::compare(&session.config, &key, old.as_ref(), session.options);
        results.push(TargetResult {
            comparison,
            key,
            referenced_from: (expression.doc_file_path.clone(), expression.doc_comment_range),
        });
    }
    return results;
}

/// Comments that hold at least one relocated target, with all of their
/// expressions. Comments of one document come last-first so rewriting one
/// never shifts the recorded position of the next.
fn relocation_groups<'a>(
    expressions: &'a [WatchExpression],
    by_key: &HashMap<&TargetKey, &TargetResult>,
) -> Vec<Vec<&'a WatchExpression>> {
    let mut groups: BTreeMap<(&Path, usize), Vec<&WatchExpression>> = BTreeMap::new();
    for expression in expressions {
        groups.entry(expression.comment_location()).or_default().push(expression);
    }

    let mut relocated: Vec<((&Path, usize), Vec<&WatchExpression>)> = groups
        .into_iter()
        .filter(|(_, members)| {
            return members.iter().any(|e| {
                return by_key.get(&e.identity_key()).is_some_and(|r| return r.relocated_to().is_some());
            });
        })
        .collect();
    relocated.sort_by(|(a, _), (b, _)| return a.0.cmp(b.0).then(b.1.cmp(&a.1)));
    return relocated.into_iter().map(|(_, members)| return members).collect();
}

/// Distinct target keys in first-seen order.
pub fn unique_targets(expressions: &[WatchExpression]) -> Vec<TargetKey> {
    let mut seen = HashSet::new();
    return expressions
        .iter()
        .map(|e| return e.identity_key())
        .filter(|k| return seen.insert(k.clone()))
        .collect();
}
