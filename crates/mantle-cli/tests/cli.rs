use assert_cmd::Command;
use predicates::prelude::*;

fn write_project(dir: &std::path::Path) {
    std::fs::write(
        dir.join("mantle.build"),
        "project('demo', version: '1.0')\nexecutable('app', 'main.c')\n",
    )
    .unwrap();
}

#[test]
fn validate_accepts_a_wellformed_build_file() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    Command::cargo_bin("mantle")
        .unwrap()
        .arg("validate")
        .arg(dir.path().join("mantle.build"))
        .assert()
        .success()
        .stdout(predicate::str::contains(" VALID"));
}

#[test]
fn validate_rejects_a_broken_build_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("mantle.build");
    std::fs::write(&file, "project('demo'\n").unwrap();
    Command::cargo_bin("mantle")
        .unwrap()
        .arg("validate")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("INVALID"));
}

#[test]
fn introspect_prints_project_structure_as_json() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    Command::cargo_bin("mantle")
        .unwrap()
        .arg("introspect")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"descriptive_name\": \"demo\""))
        .stdout(predicate::str::contains("\"app\""));
}

#[test]
fn introspect_writes_to_the_requested_file() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let out = dir.path().join("out.json");
    Command::cargo_bin("mantle")
        .unwrap()
        .arg("introspect")
        .arg(dir.path())
        .arg("--compact")
        .args(["--output"])
        .arg(&out)
        .assert()
        .success();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(doc["project"]["version"], "1.0");
}

#[test]
fn summary_lists_targets_and_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("mantle.build"),
        "project('demo')\nzlib = dependency('zlib', required: false)\nexecutable('app', 'main.c')\n",
    )
    .unwrap();
    Command::cargo_bin("mantle")
        .unwrap()
        .arg("summary")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("app"))
        .stdout(predicate::str::contains("zlib"));
}
