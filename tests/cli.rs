use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const FEED: &str = "tests/data/calc.json";

fn decompiler() -> Command {
    Command::cargo_bin("jbc-dec-rs").unwrap()
}

#[test]
fn test_decompile_prints_every_unit() {
    decompiler()
        .args(["decompile", FEED, "--sequential"])
        .assert()
        .success()
        .stdout(predicate::str::contains("// demo/Calc.inc(I)I"))
        .stdout(predicate::str::contains("return arg0 + 1;"))
        .stdout(predicate::str::contains("static int max(int arg0, int arg1) {"))
        .stdout(predicate::str::contains("// decompilation failed:"));
}

#[test]
fn test_filter_selects_units_by_signature() {
    decompiler()
        .args(["decompile", FEED, "--filter", r"\.max\("])
        .assert()
        .success()
        .stdout(predicate::str::contains("max(").and(predicate::str::contains("inc(").not()));
}

#[test]
fn test_only_failing_units_is_an_error() {
    decompiler()
        .args(["decompile", FEED, "--filter", "Broken"])
        .assert()
        .failure();
}

#[test]
fn test_output_file_and_options_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = dir.path().join("options.json");
    std::fs::write(&options, r#"{ "parallel": false, "fuse_ternary": false }"#)?;
    let output = dir.path().join("out.java");

    decompiler()
        .args(["decompile", FEED, "--filter", "Calc"])
        .arg("--options")
        .arg(&options)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let text = std::fs::read_to_string(&output)?;
    assert!(text.contains("static int inc(int arg0) {"), "{}", text);
    Ok(())
}

#[test]
fn test_cfg_writes_dot_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    decompiler()
        .args(["cfg", FEED, "--filter", "max"])
        .arg("--dot")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/Calc.max(II)I:"))
        .stdout(predicate::str::contains("Nodes: "));

    let dot = dir.path().join("unit_0_max.dot");
    assert!(Path::new(&dot).exists());
    assert!(std::fs::read_to_string(dot)?.starts_with("digraph"));
    Ok(())
}

#[test]
fn test_missing_input_fails() {
    decompiler()
        .args(["decompile", "tests/data/does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
