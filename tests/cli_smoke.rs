//! Binary smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn promethean() -> Command {
    Command::cargo_bin("promethean").expect("binary builds")
}

#[test]
fn help_lists_subcommands() {
    promethean()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_prints() {
    promethean()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("promethean"));
}

#[test]
fn run_without_plan_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    promethean()
        .arg("run")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("plan"));
}

#[test]
fn run_rejects_conflicting_plan_flags() {
    promethean()
        .args(["run", "--plan", "x", "--plan-file", "plan.txt"])
        .assert()
        .failure();
}

#[test]
fn resume_unknown_session_fails() {
    promethean()
        .args(["resume", "no-such-session-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-session-id"));
}

#[test]
fn run_help_shows_flags() {
    promethean()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--architect"))
        .stdout(predicate::str::contains("--methodology"))
        .stdout(predicate::str::contains("--max-cycles"));
}
