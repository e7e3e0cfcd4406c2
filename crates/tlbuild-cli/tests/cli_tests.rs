use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_project(dir: &Path, source: &str) {
    fs::write(
        dir.join("tlconfig.json"),
        r#"{ "compilerOptions": { "outDir": "dist" } }"#,
    )
    .unwrap();
    fs::write(dir.join("main.tl"), source).unwrap();
}

fn tlbuild() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("tlbuild"))
}

#[test]
fn test_builds_project_directory() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path(), "export let answer: number = 42\n");

    tlbuild()
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 0 errors."));

    let lua = fs::read_to_string(temp.path().join("dist/main.lua")).unwrap();
    assert!(lua.contains("local answer = 42"));
}

#[test]
fn test_accepts_config_file_path() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path(), "let x = 1\n");

    tlbuild()
        .arg(temp.path().join("tlconfig.json"))
        .assert()
        .success();
    assert!(temp.path().join("dist/main.lua").exists());
}

#[test]
fn test_unresolved_import_fails() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path(), "import \"missing\"\nlet x = 1\n");

    tlbuild()
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("TL2307"));
}

#[test]
fn test_missing_config_is_reported() {
    let temp = TempDir::new().unwrap();

    tlbuild()
        .arg(temp.path().join("nowhere"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("TL5083"));
}

#[test]
fn test_clean_removes_outputs() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path(), "let x = 1\n");

    tlbuild().arg(temp.path()).assert().success();
    assert!(temp.path().join("dist/main.lua").exists());

    tlbuild().arg(temp.path()).arg("--clean").assert().success();
    assert!(!temp.path().join("dist/main.lua").exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path(), "let x = 1\n");

    tlbuild()
        .arg(temp.path())
        .arg("--dry")
        .assert()
        .success()
        .stdout(predicate::str::contains("A non-dry build would build project"));
    assert!(!temp.path().join("dist").exists());
}
