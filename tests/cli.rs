//! CLI smoke tests over the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn tainthound() -> Command {
    Command::cargo_bin("tainthound").unwrap()
}

#[test]
fn scan_reports_sql_injection_flow() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.rs"),
        r#"
            fn handler() {
                let id = request_param("id");
                execute_query(id);
            }
        "#,
    )
    .unwrap();

    tainthound()
        .arg("scan")
        .arg(dir.path())
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sql-injection"))
        .stdout(predicate::str::contains("\"total\": 1"));
}

#[test]
fn scan_with_suppress_policy_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.rs"),
        r#"
            fn handler() {
                let id = request_param("id").replace("'", "");
                execute_query(id);
            }
        "#,
    )
    .unwrap();

    tainthound()
        .arg("scan")
        .arg(dir.path())
        .args(["--format", "json", "--weak-sanitization", "suppress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn scan_github_format_emits_error_annotation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.rs"),
        "fn handler() { execute_query(request_param(\"id\")); }",
    )
    .unwrap();

    tainthound()
        .arg("scan")
        .arg(dir.path())
        .args(["--format", "github"])
        .assert()
        .success()
        .stdout(predicate::str::contains("::error file="));
}

#[test]
fn rules_lists_builtin_table() {
    tainthound()
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("request_param"))
        .stdout(predicate::str::contains("prepare_statement"))
        .stdout(predicate::str::contains("sql_escape"));
}

#[test]
fn version_prints_package_version() {
    tainthound()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_severity_fails() {
    let dir = tempfile::tempdir().unwrap();
    tainthound()
        .arg("scan")
        .arg(dir.path())
        .args(["--severity", "tpyo"])
        .assert()
        .failure();
}

#[test]
fn unknown_policy_fails() {
    let dir = tempfile::tempdir().unwrap();
    tainthound()
        .arg("scan")
        .arg(dir.path())
        .args(["--weak-sanitization", "pretend"])
        .assert()
        .failure();
}
