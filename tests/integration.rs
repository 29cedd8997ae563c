use std::path::Path;
use std::process::{Command, Output};

fn docwatch_cmd(project: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docwatch"));
    cmd.current_dir(project);
    cmd.env_remove("DOCWATCH_LOG");
    cmd
}

/// Copy a fixture into a fresh temp directory so tests can edit it.
fn fixture(name: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    copy_tree(&Path::new("tests/fixtures").join(name), dir.path());
    dir
}

fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

fn run(project: &Path, args: &[&str]) -> Output {
    docwatch_cmd(project).args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn init(project: &Path) {
    let init = run(project, &["init"]);
    assert!(init.status.success(), "init failed: {}", String::from_utf8_lossy(&init.stderr));
}

#[test]
fn init_then_compare_passes() {
    let project = fixture("project");
    init(project.path());
    assert!(project.path().join("docs/.watch-code/snapshots").is_dir(), "snapshot dir not created");

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(0), "stdout: {}", stdout(&compare));
    assert!(stdout(&compare).contains("All 3 watched targets up to date"));
}

#[test]
fn compare_before_init_reports_new_targets() {
    let project = fixture("project");
    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(1));
    assert!(stdout(&compare).contains("NEW"));

    let fix = run(project.path(), &["compare", "--fix"]);
    assert_eq!(fix.status.code(), Some(0), "stdout: {}", stdout(&fix));

    let again = run(project.path(), &["compare"]);
    assert_eq!(again.status.code(), Some(0));
}

#[test]
fn moved_lines_are_fixed_in_the_doc() {
    let project = fixture("project");
    init(project.path());

    let lib = project.path().join("src/lib.rs");
    let original = std::fs::read_to_string(&lib).unwrap();
    std::fs::write(&lib, format!("// header one\n// header two\n{original}")).unwrap();

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(1));
    assert!(stdout(&compare).contains("MOVED    src/lib.rs:4-6 -> 6-8"));

    let fix = run(project.path(), &["compare", "--fix"]);
    assert_eq!(fix.status.code(), Some(0), "stdout: {}", stdout(&fix));

    let guide = std::fs::read_to_string(project.path().join("docs/guide.md")).unwrap();
    assert!(guide.contains("<!-- @watch src/lib.rs:6-8 -->"), "{guide}");
    assert!(guide.contains("<!-- @watch src/lib.rs:11-13, src/greet.rs -->"), "{guide}");
    assert!(guide.starts_with("# Guide\n\n`add` sums its arguments.\n"));

    let again = run(project.path(), &["compare"]);
    assert_eq!(again.status.code(), Some(0), "stdout: {}", stdout(&again));

    let snapshots = std::fs::read_dir(project.path().join("docs/.watch-code/snapshots")).unwrap().count();
    assert_eq!(snapshots, 3, "old-range snapshots should be swept");
}

#[test]
fn changed_lines_need_update() {
    let project = fixture("project");
    init(project.path());

    let lib = project.path().join("src/lib.rs");
    let edited = std::fs::read_to_string(&lib).unwrap().replace("a + b", "b + a");
    std::fs::write(&lib, edited).unwrap();

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(1));
    assert!(stdout(&compare).contains("CHANGED  src/lib.rs:4-6"));

    let fix = run(project.path(), &["compare", "--fix"]);
    assert_eq!(fix.status.code(), Some(1), "changed targets are never accepted by --fix");

    let update = run(project.path(), &["update", "--from", "docs/guide.md"]);
    assert!(update.status.success(), "update failed: {}", String::from_utf8_lossy(&update.stderr));

    let again = run(project.path(), &["compare"]);
    assert_eq!(again.status.code(), Some(0));
}

#[test]
fn deleted_source_exits_two() {
    let project = fixture("project");
    init(project.path());
    std::fs::remove_file(project.path().join("src/greet.rs")).unwrap();

    let lib = project.path().join("src/lib.rs");
    let edited = std::fs::read_to_string(&lib).unwrap().replace("a - b", "b - a");
    std::fs::write(&lib, edited).unwrap();

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(2));
    assert!(stdout(&compare).contains("MISSING  src/greet.rs"));
}

#[test]
fn invalid_range_is_an_error_not_a_new_target() {
    let project = fixture("project");
    std::fs::write(project.path().join("docs/guide.md"), "# Guide\n\n<!-- @watch src/lib.rs:9-3 -->\n").unwrap();

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(1));
    let out = stdout(&compare);
    assert!(out.contains("ERROR    src/lib.rs:9-3"), "{out}");
    assert!(!out.contains("NEW"), "{out}");
    assert!(!String::from_utf8_lossy(&compare.stderr).contains("compare --fix"));

    let fix = run(project.path(), &["compare", "--fix"]);
    assert_eq!(fix.status.code(), Some(1), "stdout: {}", stdout(&fix));
}

#[test]
fn status_always_exits_zero() {
    let project = fixture("project");
    init(project.path());
    std::fs::remove_file(project.path().join("src/greet.rs")).unwrap();

    let status = run(project.path(), &["status"]);
    assert!(status.status.success());
    let out = stdout(&status);
    assert!(out.contains("EQUAL    src/lib.rs:4-6"));
    assert!(out.contains("MISSING  src/greet.rs"));
}

#[test]
fn invalid_config_is_a_runtime_error() {
    let project = fixture("project");
    std::fs::write(project.path().join(".docwatch.toml"), "trigger_keywords = []\n").unwrap();

    let compare = run(project.path(), &["compare"]);
    assert_eq!(compare.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&compare.stderr).contains("Invalid Config"));
}

#[test]
fn clean_removes_unreferenced_snapshots() {
    let project = fixture("project");
    init(project.path());
    std::fs::write(project.path().join("docs/guide.md"), "# Guide\n\n<!-- @watch src/greet.rs -->\n").unwrap();

    let clean = run(project.path(), &["clean"]);
    assert!(clean.status.success());
    assert!(String::from_utf8_lossy(&clean.stderr).contains("Removed 2 unused snapshots"));
}

#[test]
fn info_json_is_valid() {
    let project = fixture("project");
    let info = run(project.path(), &["info", "--json"]);
    assert!(info.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&info.stdout).unwrap();
    assert_eq!(parsed["current_state"]["config_found"], true);
    assert_eq!(parsed["current_state"]["hash_algorithm"], "sha256");
}
