//! CLI behaviour: exit codes, output modes and Crashfile discovery

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PASSING: &str = r#"
vars:
  name: world
plans:
  - plan: greet
    steps:
      - run: {name: say-hello, type: shell, params: {command: "echo hello $name"}}
        check: out eq 'hello world'
"#;

const FAILING: &str = r#"
plans:
  - plan: greet
    steps:
      - run: {type: shell, params: {command: "echo hello"}}
        check: out eq 'goodbye'
"#;

/// Command running in `dir` with settings isolated from the user's
fn crash(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("crash").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env_remove("RUST_LOG");
    cmd
}

fn workspace(crashfile: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Crashfile.yml"), crashfile).unwrap();
    dir
}

#[test]
fn test_passing_plan_exits_zero() {
    let dir = workspace(PASSING);
    crash(dir.path())
        .args(["test", "--no-color"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("greet"))
        .stdout(predicate::str::contains("say-hello ✓"));
}

#[test]
fn test_failing_check_exits_two() {
    let dir = workspace(FAILING);
    crash(dir.path())
        .args(["test", "--no-color"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("[✗] out eq 'goodbye'"));
}

#[test]
fn test_set_overrides_vars() {
    let dir = workspace(PASSING);
    crash(dir.path())
        .args(["test", "--no-color", "-s", "name=there"])
        .assert()
        .code(2);
}

#[test]
fn test_quiet_prints_nothing() {
    let dir = workspace(FAILING);
    crash(dir.path())
        .args(["test", "-q"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_json_output() {
    let dir = workspace(PASSING);
    let output = crash(dir.path())
        .args(["test", "--json", "-vv"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let events: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let check = events.iter().find(|e| e["type"] == "check").unwrap();
    assert_eq!(check["pass"], true);
    assert_eq!(check["vars"]["name"], "world");
    assert!(events
        .iter()
        .any(|e| e["type"] == "action" && e["result"]["out"] == "hello world"));
}

#[test]
fn test_compile_error_exits_one() {
    let dir = workspace("plans:\n  - plan: bad\n    steps:\n      - run: {type: shell}\n        check: out eq\n");
    crash(dir.path())
        .arg("test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_crashfile() {
    let dir = tempfile::tempdir().unwrap();
    crash(dir.path())
        .arg("test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no Crashfile found"));
}

#[test]
fn test_validate() {
    let dir = workspace(PASSING);
    crash(dir.path())
        .args(["validate", "-f", "Crashfile.yml"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("1 plan"));

    let bad = workspace("plans:\n  - plan: p\n    steps:\n      - run: {type: ftp}\n");
    crash(bad.path())
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown action type: ftp"));
}
