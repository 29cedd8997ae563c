use std::path::Path;

use serde::Serialize;

use crate::config::{self, Config};
use crate::patterns::CommentPatternRegistry;
use crate::store::SNAPSHOT_EXTENSION;

/// Output the comprehensive docwatch reference document.
pub fn run(root: &Path, json: bool) {
    let state = gather_state(root);

    if json {
        print_json(&state);
    } else {
        print_markdown(&state);
    }
    return;
}

// ── State gathering ───────────────────────────────────────────────────

struct CurrentState {
    algorithm: Option<&'static str>,
    config_error: Option<String>,
    config_found: bool,
    extensions: Vec<String>,
    layout: Option<&'static str>,
    snapshot_files: Option<usize>,
}

fn gather_state(root: &Path) -> CurrentState {
    let config_found = root.join(config::CONFIG_FILE).is_file();

    return match Config::load(root) {
        Ok(config) => {
            let snapshot_files = std::fs::read_dir(config.snapshot_dir()).ok().map(|entries| {
                return entries
                    .filter_map(Result::ok)
                    .filter(|e| return e.path().extension().is_some_and(|x| return x == SNAPSHOT_EXTENSION))
                    .count();
            });
            CurrentState {
                algorithm: Some(config.hash_algorithm.name()),
                config_error: None,
                config_found,
                extensions: config.comment_patterns.extensions().map(str::to_string).collect(),
                layout: Some(if config.combine { "combined" } else { "single" }),
                snapshot_files,
            }
        },
        Err(e) => CurrentState {
            algorithm: None,
            config_error: Some(e.to_string()),
            config_found,
            extensions: CommentPatternRegistry::default().extensions().map(str::to_string).collect(),
            layout: None,
            snapshot_files: None,
        },
    };
}

// ── Markdown output ───────────────────────────────────────────────────

fn print_markdown(state: &CurrentState) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_state(state);
    println!();
    print_markdown_exit_codes();
    return;
}

fn print_markdown_header(version: &str) {
    print!(
        "\
# docwatch {version}

Keep documentation comments in sync with the source lines they reference.
Each watch expression gets a content snapshot; later runs report whether the
lines changed, moved, or disappeared.

## Watch Expression Syntax

    <!-- @watch src/lib.rs:10-24 -->             line range
    <!-- @watch src/lib.rs:7 -->                 single line
    <!-- @watch src/lib.rs -->                   whole file
    <!-- @watch src/a.rs:1-3, \"my dir/b.rs\" --> several targets, quoted path

## Workflow

    docwatch init                      Record snapshots for targets without one
    docwatch compare                   Report changed / moved / missing targets (exit 0/1/2)
    docwatch compare --fix             Rewrite moved ranges and record new targets
    docwatch update                    Re-record every snapshot, drop unused ones
    docwatch update --from <doc.md>    Re-record targets referenced from one document
    docwatch status                    Show every expression and its outcome
    docwatch clean                     Delete snapshots no expression references
    docwatch watch                     Re-run compare on file changes

## Configuration (.docwatch.toml)

    doc_root = \"docs\"                   # where documentation lives
    source_root = \".\"                   # watch targets resolve against this
    watch_code_dir = \".watch-code\"      # under doc_root
    working_dir = \"snapshots\"           # under watch_code_dir
    hash_algorithm = \"sha256\"           # sha256 | sha512 | blake3
    compress = false                    # store one digest per range
    combine = false                     # one snapshot file per source file
    recursive = true                    # descend into subdirectories
    trigger_keywords = [\"@watch\"]
    include = [\"guides/\"]               # only scan these prefixes
    ignore = [\"guides/archive/\"]        # skip these prefixes

    [[comment_patterns.rst]]
    start = \"..\"
    end = \"..\"

## Current State

"
    );
    return;
}

fn print_markdown_state(state: &CurrentState) {
    if state.config_found {
        println!("Config:      {} (found)", config::CONFIG_FILE);
    } else {
        println!("Config:      {} (not found, using defaults)", config::CONFIG_FILE);
    }
    if let Some(reason) = &state.config_error {
        println!("Config error: {reason}");
    }

    match state.snapshot_files {
        Some(n) => println!("Snapshots:   {n} files"),
        None => println!("Snapshots:   (none recorded)"),
    }
    if let (Some(algorithm), Some(layout)) = (state.algorithm, state.layout) {
        println!("Storage:     {algorithm}, {layout} layout");
    }
    println!("Extensions:  {}", state.extensions.join(", "));
    return;
}

fn print_markdown_exit_codes() {
    print!(
        "\
## Exit Codes

| Code | Meaning |
|------|---------|
| 0    | Success / all targets up to date |
| 1    | Changed, moved, unrecorded, or invalid targets |
| 2    | Watched source files missing |
| 3    | Runtime error |
"
    );
    return;
}

// ── JSON output ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct InfoJson {
    current_state: StateJson,
    exit_codes: Vec<ExitCodeInfo>,
    hash_algorithms: Vec<&'static str>,
    version: String,
}

#[derive(Serialize)]
struct ExitCodeInfo {
    code: u8,
    meaning: &'static str,
}

#[derive(Serialize)]
struct StateJson {
    config_error: Option<String>,
    config_found: bool,
    extensions: Vec<String>,
    hash_algorithm: Option<&'static str>,
    layout: Option<&'static str>,
    snapshot_files: Option<usize>,
}

fn print_json(state: &CurrentState) {
    let info = InfoJson {
        current_state: StateJson {
            config_error: state.config_error.clone(),
            config_found: state.config_found,
            extensions: state.extensions.clone(),
            hash_algorithm: state.algorithm,
            layout: state.layout,
            snapshot_files: state.snapshot_files,
        },
        exit_codes: vec![
            ExitCodeInfo { code: 0, meaning: "Success / all targets up to date" },
            ExitCodeInfo { code: 1, meaning: "Changed, moved, unrecorded, or invalid targets" },
            ExitCodeInfo { code: 2, meaning: "Watched source files missing" },
            ExitCodeInfo { code: 3, meaning: "Runtime error" },
        ],
        hash_algorithms: vec!["sha256", "sha512", "blake3"],
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info).unwrap_or_default();
    println!("{json}");
    return;
}
